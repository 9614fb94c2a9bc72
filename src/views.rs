/// A page in the user-facing activation and password-reset flows. The route
/// handlers choose the page and its data; the application renders it to HTML
/// through `AppViews::render`, typically from a template named by
/// `Page::template`.
///
/// Form pages carry the username so that a re-render after a validation
/// error preserves what the user already entered; passwords are never
/// carried back.
#[derive(Debug)]
pub enum Page<'a> {
    /// The choose-a-password form behind an activation link.
    ActivateForm {
        username: &'a str,
        errors: Vec<String>,
    },

    /// Shown when an activation link is unknown, expired, or already used.
    ActivationLinkExpired,

    /// Shown once after a successful activation.
    ActivationSuccessful {
        username: &'a str,
    },

    /// The request-a-reset-link form.
    ForgotPasswordForm {
        errors: Vec<String>,
    },

    /// Confirmation that a reset link has been sent.
    ForgotPasswordSent,

    /// The choose-a-new-password form behind a reset link.
    ResetPasswordForm {
        username: &'a str,
        errors: Vec<String>,
    },

    /// Shown when a reset link is unknown, expired, or already used.
    ResetLinkExpired,

    /// Shown once after a successful password reset.
    ResetPasswordSuccessful {
        username: &'a str,
    },

    /// Any path this service does not serve.
    NotFound,
}

impl Page<'_> {
    /// The name of the page's template, excluding extensions, in the
    /// application's template directory.
    pub fn template(&self) -> &'static str {
        match self {
            Self::ActivateForm {..} => "activate",
            Self::ActivationLinkExpired => "activation-error",
            Self::ActivationSuccessful {..} => "activation-successful",
            Self::ForgotPasswordForm {..} => "forgot-password",
            Self::ForgotPasswordSent => "forgot-password-successful",
            Self::ResetPasswordForm {..} => "reset-password",
            Self::ResetLinkExpired => "reset-password-error",
            Self::ResetPasswordSuccessful {..} => "reset-password-successful",
            Self::NotFound => "404",
        }
    }
}
