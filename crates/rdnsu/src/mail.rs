//! Mail notifications
//!
//! [`MailLayer`] queues log events at or above the configured level and
//! [`Mailer`] delivers them over SMTP from the worker's runtime. Suspension
//! warnings and reminders reach the operator this way.

use anyhow::Context as _;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rdnsu_core::EmailSettings;
use std::fmt::{self, Write as _};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber, debug, warn};
use tracing_subscriber::layer::{Context, Layer};

const SMTP_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SUBJECT: &str = "Remote DNS Updater: {{level}} {{msg}}";

/// A log event waiting to be mailed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

/// Build the layer and the mailer that drains it
pub fn channel(settings: &EmailSettings) -> anyhow::Result<(MailLayer, Mailer)> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let layer = MailLayer {
        level: settings.level().into(),
        sender,
    };
    Ok((layer, Mailer::new(settings, receiver)?))
}

/// Tracing layer forwarding events to a [`Mailer`]
pub struct MailLayer {
    level: Level,
    sender: mpsc::UnboundedSender<Notification>,
}

impl<S: Subscriber> Layer<S> for MailLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        // Delivery failures are logged from this module and must not be mailed
        if *metadata.level() > self.level || metadata.target() == module_path!() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        // Closed once the mailer has finished
        let _ = self.sender.send(Notification {
            level: *metadata.level(),
            message: visitor.0,
        });
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{:?}", value);
        } else {
            let _ = write!(self.0, " {}={:?}", field.name(), value);
        }
    }
}

/// SMTP sender for queued notifications
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    subject: String,
    receiver: mpsc::UnboundedReceiver<Notification>,
}

impl Mailer {
    fn new(
        settings: &EmailSettings,
        receiver: mpsc::UnboundedReceiver<Notification>,
    ) -> anyhow::Result<Self> {
        let to: Mailbox = settings
            .to
            .parse()
            .with_context(|| format!("Invalid email recipient \"{}\"", settings.to))?;
        let from: Mailbox = settings
            .sender()
            .parse()
            .with_context(|| format!("Invalid email sender \"{}\"", settings.sender()))?;

        let builder = if settings.ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
        } else if settings.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str())
        };

        let mut builder = builder
            .port(settings.port())
            .timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
            subject: settings
                .subject
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            receiver,
        })
    }

    /// Deliver notifications until `stop` resolves, then flush the queue
    pub async fn run<F>(mut self, stop: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;

                Some(notification) = self.receiver.recv() => self.deliver(&notification).await,
                _ = &mut stop => break,
            }
        }

        while let Ok(notification) = self.receiver.try_recv() {
            self.deliver(&notification).await;
        }
    }

    async fn deliver(&self, notification: &Notification) {
        let result = match self.compose(notification) {
            Ok(message) => self.transport.send(message).await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => debug!("Mailed {} notification to {}", notification.level, self.to),
            Err(e) => warn!("Failed to mail notification to {}: {}", self.to, e),
        }
    }

    fn compose(&self, notification: &Notification) -> anyhow::Result<Message> {
        let first_line = notification.message.lines().next().unwrap_or_default();
        let subject = self
            .subject
            .replace("{{level}}", &notification.level.as_str().to_lowercase())
            .replace("{{msg}}", first_line);

        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject.trim_end())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.message.clone())?;

        Ok(message)
    }
}

/// A [`Mailer`] running in the background
pub struct MailTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl MailTask {
    /// Spawn `mailer` on the current runtime
    pub fn spawn(mailer: Mailer) -> Self {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(mailer.run(async move {
            let _ = stopped.await;
        }));
        Self { stop, handle }
    }

    /// Deliver what is still queued, giving up after a bounded wait
    pub async fn finish(self) {
        let _ = self.stop.send(());
        if tokio::time::timeout(DRAIN_TIMEOUT, self.handle).await.is_err() {
            warn!("Gave up delivering queued mail notifications");
        }
    }
}
