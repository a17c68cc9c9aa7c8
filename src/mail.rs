use std::sync::Arc;

use crate::config::Config;

/// An error raised by a [`Mailer`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("mail delivery failed: {0}")]
	Delivery(String),
}

/// A plain text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
	pub from: String,
	pub to: String,
	pub subject: String,
	pub body: String,
}

/// Delivers outgoing mail.
#[axum::async_trait]
pub trait Mailer: Send + Sync {
	async fn send(&self, mail: Mail) -> Result<(), Error>;
}

pub type SharedMailer = Arc<dyn Mailer>;

/// Writes every mail to the log instead of delivering it.
#[derive(Debug, Default)]
pub struct LogMailer;

#[axum::async_trait]
impl Mailer for LogMailer {
	async fn send(&self, mail: Mail) -> Result<(), Error> {
		if !mail.to.contains('@') {
			return Err(Error::Delivery(format!("invalid recipient {:?}", mail.to)));
		}

		tracing::info!(
			from = %mail.from,
			to = %mail.to,
			subject = %mail.subject,
			body = %mail.body,
			"sending mail"
		);

		Ok(())
	}
}

/// Keeps sent mail in memory so tests can inspect it.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryMailer {
	pub outbox: std::sync::Mutex<Vec<Mail>>,
}

#[cfg(test)]
impl MemoryMailer {
	pub fn last_to(&self, to: &str) -> Option<Mail> {
		self.outbox
			.lock()
			.unwrap()
			.iter()
			.rev()
			.find(|mail| mail.to == to)
			.cloned()
	}
}

#[cfg(test)]
#[axum::async_trait]
impl Mailer for MemoryMailer {
	async fn send(&self, mail: Mail) -> Result<(), Error> {
		self.outbox.lock().unwrap().push(mail);
		Ok(())
	}
}

/// Builds the links and text for the account mails.
#[derive(Debug, Clone)]
pub struct Templates {
	pub from: String,
	pub frontend_url: String,
	pub site_domain: String,
}

impl From<&Config> for Templates {
	fn from(config: &Config) -> Self {
		Self {
			from: config.email_from.clone(),
			frontend_url: config.frontend_url.clone(),
			site_domain: config.site_domain.clone(),
		}
	}
}

impl Templates {
	pub fn verification(&self, to: &str, name: &str, token: &str) -> Mail {
		let link = format!("{}/email-verification?token={token}", self.frontend_url);

		Mail {
			from: self.from.clone(),
			to: to.to_string(),
			subject: "Welcome, please verify your email address".into(),
			body: format!(
				"Hi {name},\n\nPlease verify your email address by visiting {link}\n\n{}",
				self.site_domain
			),
		}
	}

	pub fn password_reset(&self, to: &str, name: &str, token: &str) -> Mail {
		let link = format!("{}/password-reset?token={token}", self.frontend_url);

		Mail {
			from: self.from.clone(),
			to: to.to_string(),
			subject: "Password Reset".into(),
			body: format!(
				"Hi {name},\n\nYou can reset your password by visiting {link}\n\n{}",
				self.site_domain
			),
		}
	}
}

/// Pulls the `token` query parameter back out of a mail body.
#[cfg(test)]
pub fn token_from_body(body: &str) -> Option<String> {
	let start = body.find("?token=")? + "?token=".len();
	let token = body[start..].split_whitespace().next()?;

	Some(token.to_string())
}
