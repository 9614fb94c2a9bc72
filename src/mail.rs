use crate::app::App;

/// A type of email which can be sent to an external user or their inviter.
/// Each variant knows its subject line, its template name, and the variables
/// the template interpolates; the application's mailer owns the template
/// files and the SMTP transport.
#[derive(Debug)]
pub enum Mail {
    /// A new external user has been invited; contains their activation link.
    Invitation {
        username: String,
        creator: String,
        hash_url: String,
    },

    /// Confirms to the inviter that their invitation went out.
    InvitationSent {
        username: String,
        creator: String,
    },

    /// Confirms to the user that their account is now active.
    ActivationSuccessful {
        username: String,
    },

    /// Notifies the original inviter that the user they invited has
    /// activated their account.
    InvitationAccepted {
        username: String,
        creator: String,
    },

    /// Contains a password-reset link, sent on a forgot-password request.
    PasswordReset {
        username: String,
        hash_url: String,
    },
}

impl Mail {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Invitation {..} => "Welcome!",
            Self::InvitationSent {..} => "You have invited an external user",
            Self::ActivationSuccessful {..} => "You have successfully activated your account",
            Self::InvitationAccepted {..} => "An external user has activated their account",
            Self::PasswordReset {..} => "Password reset",
        }
    }

    /// The name of the mail template, excluding extensions, in the
    /// application's template directory.
    pub fn template(&self) -> &'static str {
        match self {
            Self::Invitation {..} => "invitation",
            Self::InvitationSent {..} => "invitation-sent",
            Self::ActivationSuccessful {..} => "activation-successful",
            Self::InvitationAccepted {..} => "invitation-accepted",
            Self::PasswordReset {..} => "reset-password",
        }
    }

    /// The variables to interpolate into the template, as key/value pairs.
    pub fn variables(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Invitation {username, creator, hash_url} => vec![
                ("USERNAME", username),
                ("CREATOR", creator),
                ("HASH_URL", hash_url),
            ],
            Self::InvitationSent {username, creator} => vec![
                ("USERNAME", username),
                ("CREATOR", creator),
            ],
            Self::ActivationSuccessful {username} => vec![
                ("USERNAME", username),
            ],
            Self::InvitationAccepted {username, creator} => vec![
                ("USERNAME", username),
                ("CREATOR", creator),
            ],
            Self::PasswordReset {username, hash_url} => vec![
                ("USERNAME", username),
                ("HASH_URL", hash_url),
            ],
        }
    }
}

/// Sends a mail without letting delivery problems affect the caller: a
/// failure is logged and swallowed. The record mutation that prompted the
/// mail has already been committed by the time this is called.
pub(crate) async fn send_best_effort<A: App>(app: &A, to: &str, mail: Mail) {
    if !app.mail_enabled() {
        log::warn!(
            "Not sending email to '{to}' with subject '{}', because email delivery is disabled",
            mail.subject(),
        );
        return;
    }

    if let Err(e) = app.send_mail(to, &mail).await {
        log::warn!("Failed to send '{}' email to '{to}': {e}", mail.template());
    }
}
