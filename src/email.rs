use serde::Deserialize;

fn default_subject() -> String {
    "Ethio Learners - Verify your email".to_string()
}

fn default_body_template() -> String {
    "<p>Your OTP is <strong>{otp}</strong></p>".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub from_address: String,
    /// Fixed recipient list for verification mail.
    pub recipients: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    /// HTML body; `{otp}` is replaced with the generated code.
    #[serde(default = "default_body_template")]
    pub body_template: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_and_body_default_when_omitted() {
        let config: EmailConfig = toml::from_str(
            r#"
            smtp_host = "smtp.example.com"
            smtp_port = 587
            smtp_user = "mailer"
            smtp_pass = "secret"
            from_address = "Ethio Learners <onboarding@resend.dev>"
            recipients = ["learner@example.com"]
            "#,
        )
        .unwrap();

        assert_eq!(config.subject, "Ethio Learners - Verify your email");
        assert!(config.body_template.contains("{otp}"));
    }
}
