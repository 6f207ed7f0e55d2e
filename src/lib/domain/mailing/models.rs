//! Campaign, mail and blacklist models

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::communication::email_addresses::EmailAddress;

/// A reusable mail definition sent for one kind of event
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Campaign {
    /// Campaign ID
    pub id: i64,

    /// Unique slug identifying the campaign in code
    pub key: String,

    /// Display name
    pub name: String,

    /// Subject template
    pub subject: String,

    /// Whether the configured subject prefix is prepended to the subject
    pub prefix_subject: bool,

    /// Custom template path, blank to use the template named after the key
    pub template_file: String,

    /// Subscription type recipients must be subscribed to, if any
    pub subscription_type_id: Option<i64>,

    /// Whether mails are generated for this campaign
    pub is_enabled: bool,
}

impl Campaign {
    /// The template the external renderer uses for this campaign
    pub fn template_name(&self) -> String {
        let template_file = self.template_file.trim();

        if template_file.is_empty() {
            format!("mailing/{}.html", self.key)
        } else {
            template_file.to_string()
        }
    }
}

/// Delivery state of a mail
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum MailStatus {
    /// Waiting to be sent
    #[default]
    Pending,

    /// Handed over to the delivery pipeline
    Sent,

    /// Withdrawn before being sent
    Canceled,

    /// Delivery failed, see the failure reason
    Failure,
}

impl MailStatus {
    /// The value stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Canceled => "canceled",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for MailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "canceled" => Ok(Self::Canceled),
            "failure" => Ok(Self::Failure),
            other => Err(anyhow::anyhow!("unknown mail status \"{other}\"")),
        }
    }
}

/// One rendered outgoing mail
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mail {
    /// Mail ID
    pub id: i64,

    /// The campaign the mail was generated from, if any
    pub campaign_id: Option<i64>,

    /// Earliest time the mail may be sent
    pub scheduled_on: Option<DateTime<Utc>>,

    /// When the mail was sent
    pub sent_on: Option<DateTime<Utc>>,

    /// Delivery state
    pub status: MailStatus,

    /// Why delivery failed, blank unless `status` is [`MailStatus::Failure`]
    pub failure_reason: String,

    /// Rendered subject
    pub subject: String,

    /// Rendered HTML body
    pub html_body: String,

    /// Rendered plain text body
    pub text_body: String,
}

/// What a static attachment or a header is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentOwner {
    /// Shared by every mail of a campaign
    Campaign(i64),

    /// Specific to one mail
    Mail(i64),
}

/// An address that must not receive mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlacklistEntry {
    /// The blocked address
    pub email: EmailAddress,

    /// When the address was reported
    pub reported_on: DateTime<Utc>,

    /// Why the address was blocked, e.g. a hard bounce or a complaint
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_template_name_defaults_to_key() {
        let campaign = Campaign {
            key: "welcome".to_string(),
            ..Default::default()
        };

        assert_eq!(campaign.template_name(), "mailing/welcome.html");
    }

    #[test]
    fn test_template_name_uses_template_file() {
        let campaign = Campaign {
            key: "welcome".to_string(),
            template_file: "mailing/templates/welcome_v2.html".to_string(),
            ..Default::default()
        };

        assert_eq!(campaign.template_name(), "mailing/templates/welcome_v2.html");
    }

    #[test]
    fn test_mail_status_round_trips_through_storage_value() -> TestResult {
        for status in [
            MailStatus::Pending,
            MailStatus::Sent,
            MailStatus::Canceled,
            MailStatus::Failure,
        ] {
            assert_eq!(status.as_str().parse::<MailStatus>()?, status);
        }

        assert!("queued".parse::<MailStatus>().is_err());

        Ok(())
    }
}
