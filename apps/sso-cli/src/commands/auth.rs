use anyhow::{Context, Result, bail};
use clap::Args;
use sso_session::{SecretString, SsoSession};

/// Log in with email and password
#[derive(Args)]
pub struct LoginArgs {
    #[arg(short, long)]
    email: String,

    #[arg(short, long, env = "SSO_PASSWORD", hide_env_values = true)]
    password: String,
}

impl LoginArgs {
    pub async fn run(self, session: &SsoSession) -> Result<()> {
        let password = SecretString::new(self.password);
        session
            .login(&self.email, &password)
            .await
            .with_context(|| format!("login failed for {}", self.email))?;

        let who = session.credentials().user_name().unwrap_or(self.email);
        println!("logged in as {who}");
        Ok(())
    }
}

/// Revoke the refresh token and forget stored credentials
pub async fn logout(session: &SsoSession) {
    session.logout().await;
    println!("logged out");
}

/// Print the logged-in user and their roles
pub fn whoami(session: &SsoSession) -> Result<()> {
    let Some(claims) = session.credentials().claims() else {
        bail!("not logged in");
    };

    println!("{}", claims.user_name().or(claims.subject()).unwrap_or("<unknown>"));
    for role in claims.roles() {
        println!("  {role}");
    }
    Ok(())
}
