mod api;
mod auth;
mod register;

pub use api::GetArgs;
pub use auth::{LoginArgs, logout, whoami};
pub use register::RegisterArgs;

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
