use anyhow::{Context, Result};
use clap::Args;
use sso_session::{CreateAccountRequest, SecretString, SsoSession};

/// Create a new account on the SSO backend
#[derive(Args)]
pub struct RegisterArgs {
    #[arg(long)]
    account_name: String,

    #[arg(short, long)]
    email: String,

    #[arg(short, long, env = "SSO_PASSWORD", hide_env_values = true)]
    password: String,
}

impl RegisterArgs {
    pub async fn run(self, session: &SsoSession) -> Result<()> {
        let request = CreateAccountRequest {
            account_name: self.account_name,
            email: self.email,
            password: SecretString::new(self.password),
        };
        let record = session
            .create_account(&request)
            .await
            .with_context(|| format!("failed to create account {}", request.account_name))?;
        super::print_json(&record)
    }
}
