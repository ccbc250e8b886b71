use async_trait::async_trait;
use std::{io::Write, path::Path};
use tempfile::NamedTempFile;

use crate::config::EmailSettings;
use crate::error::{Error, Result};
use crate::tracker::TransitionEvent;
use crate::transport::run_curl;

/// Product details included alongside every alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContext {
    pub product_id: u64,
    pub store_id: u64,
    pub product_url: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &TransitionEvent, context: &MatchContext) -> Result<()>;
}

/// Sends alerts over SMTPS by handing a prepared message to curl.
pub struct SmtpNotifier {
    email: EmailSettings,
}

impl SmtpNotifier {
    #[must_use]
    pub fn new(email: EmailSettings) -> Self {
        Self { email }
    }

    /// Credentials go in a curl config file so they never appear in argv.
    fn credentials_file(&self) -> Result<NamedTempFile> {
        // NamedTempFile is created with mode 0600
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            "user = \"{}\"",
            escape_config_value(&format!("{}:{}", self.email.username, self.email.password))
        )?;
        file.flush()?;
        Ok(file)
    }

    fn curl_args(&self, credentials: &Path) -> Vec<String> {
        let mut args = vec![
            "-sS".to_string(),
            "--ssl-reqd".to_string(),
            "-K".to_string(),
            credentials.display().to_string(),
            "--url".to_string(),
            format!("smtps://{}:{}", self.email.smtp_server, self.email.smtp_port),
            "--mail-from".to_string(),
            self.email.username.clone(),
        ];
        for recipient in &self.email.to_emails {
            args.push("--mail-rcpt".to_string());
            args.push(recipient.clone());
        }
        args.push("-T".to_string());
        args.push("-".to_string());
        args
    }

    fn compose(&self, event: &TransitionEvent, context: &MatchContext) -> String {
        let detail = event.detail();
        let headers = format!(
            "From: {}\r\nTo: {}\r\nSubject: Zara Alert: AVAILABLE ({detail})\r\nDate: {}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n",
            self.email.username,
            self.email.to_emails.join(", "),
            event.timestamp.to_rfc2822(),
        );
        let body = format!(
            "Your watched Zara item is now AVAILABLE!\n\n\
             Detail: {detail}\n\
             Product ID: {}\n\
             Store ID: {}\n\
             Product URL: {}\n\n\
             Raw payload:\n\
             {}\n",
            context.product_id, context.store_id, context.product_url, event.raw_payload,
        );
        // SMTP wants CRLF line endings throughout
        format!("{headers}\r\n{}", body.replace('\n', "\r\n"))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, event: &TransitionEvent, context: &MatchContext) -> Result<()> {
        let message = self.compose(event, context);
        let credentials = self.credentials_file()?;
        let args = self.curl_args(credentials.path());
        let output = run_curl(&args, Some(message.as_bytes())).await?;
        drop(credentials);
        if output.success() {
            Ok(())
        } else {
            Err(Error::Notify(format!(
                "smtp delivery failed (rc={:?}): {}",
                output.code, output.stderr
            )))
        }
    }
}

// Double-quoted curl config values treat backslash as an escape character.
fn escape_config_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
