use vicinity_engine::{DeliveryError, LogNotifier, NotificationRequest, Notifier, WebhookNotifier};

/// The notifier selected by configuration.
pub enum AppNotifier {
    Log(LogNotifier),
    Webhook(WebhookNotifier),
}

impl AppNotifier {
    pub fn from_url(url: Option<&str>) -> Self {
        match url {
            Some(url) => AppNotifier::Webhook(WebhookNotifier::new(url)),
            None => AppNotifier::Log(LogNotifier),
        }
    }
}

impl Notifier for AppNotifier {
    async fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        match self {
            AppNotifier::Log(n) => n.deliver(request).await,
            AppNotifier::Webhook(n) => n.deliver(request).await,
        }
    }
}
