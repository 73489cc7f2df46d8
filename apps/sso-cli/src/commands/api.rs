use anyhow::{Context, Result};
use clap::Args;
use sso_session::SsoSession;
use sso_session::sso_http::ApiRequest;

/// Authenticated GET against the API; prints the response body
#[derive(Args)]
pub struct GetArgs {
    /// Path relative to the API base URL
    path: String,

    /// Query parameter as `name=value`; repeatable
    #[arg(short, long = "query", value_parser = parse_query_pair)]
    query: Vec<(String, String)>,
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))
}

impl GetArgs {
    pub async fn run(self, session: &SsoSession) -> Result<()> {
        let request = self
            .query
            .into_iter()
            .fold(ApiRequest::get(&self.path), |req, (name, value)| {
                req.query(name, value)
            });

        let response = session
            .executor()
            .execute(request)
            .await
            .with_context(|| format!("GET {} failed", self.path))?;

        match response.json::<serde_json::Value>() {
            Ok(body) => super::print_json(&body),
            Err(_) => {
                println!("{}", response.text());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_split_on_first_equals() {
        assert_eq!(
            parse_query_pair("filter=a=b"),
            Ok(("filter".to_owned(), "a=b".to_owned()))
        );
        assert_eq!(parse_query_pair("page="), Ok(("page".to_owned(), String::new())));
        assert!(parse_query_pair("=1").is_err());
        assert!(parse_query_pair("page").is_err());
    }
}
