use clap::Parser;

use crate::DEFAULT_ENDPOINT;

#[derive(Parser)]
#[command(name = "chorus")]
#[command(version = "0.4.0")]
#[command(about = "Stream one prompt to many models and compare their answers")]
pub struct Args {
    /// Prompt to send to every selected model
    pub prompt: String,

    /// Model to query; repeat the flag for a multi-model fan-out
    #[arg(long = "model", short = 'm', default_value = "default")]
    pub models: Vec<String>,

    /// Collaborator inference endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Bearer token for the endpoint (overrides the stored preference)
    #[arg(long)]
    pub token: Option<String>,

    /// Persist --token to the preferences file
    #[arg(long)]
    pub save_token: bool,

    /// Optional system prompt prepended to the conversation
    #[arg(long)]
    pub system: Option<String>,

    /// Maximum tokens to generate per model
    #[arg(long, default_value = "1024")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value = "0.7")]
    pub temperature: f32,

    /// Render each model's reasoning text (dimmed) as it streams
    #[arg(long)]
    pub show_thinking: bool,

    /// Run consensus/uniqueness analysis once all streams complete
    #[arg(long)]
    pub consensus: bool,
}

/// Endpoint precedence: CLI flag, then stored preference, then built-in.
pub fn resolve_endpoint(cli: Option<&str>, stored: Option<&str>) -> String {
    cli.or(stored).unwrap_or(DEFAULT_ENDPOINT).to_string()
}

/// Token precedence: CLI flag, then stored preference.
pub fn resolve_token(cli: Option<&str>, stored: Option<&str>) -> Option<String> {
    cli.or(stored).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["chorus", "hello world"]);
        assert_eq!(args.prompt, "hello world");
        assert_eq!(args.models, vec!["default".to_string()]);
        assert!(args.endpoint.is_none());
        assert!(args.token.is_none());
        assert!(!args.save_token);
        assert!(!args.show_thinking);
        assert!(!args.consensus);
        assert_eq!(args.max_tokens, 1024);
    }

    #[test]
    fn test_args_parse_multiple_models() {
        let args = Args::parse_from([
            "chorus", "prompt", "-m", "quartz-mini", "--model", "basalt-large",
        ]);
        assert_eq!(
            args.models,
            vec!["quartz-mini".to_string(), "basalt-large".to_string()]
        );
    }

    #[test]
    fn test_args_parse_full() {
        let args = Args::parse_from([
            "chorus",
            "test prompt",
            "--model",
            "quartz-mini",
            "--endpoint",
            "http://localhost:9000/api/chat",
            "--token",
            "sk-abc",
            "--save-token",
            "--system",
            "Be concise.",
            "--max-tokens",
            "256",
            "--temperature",
            "0.2",
            "--show-thinking",
            "--consensus",
        ]);
        assert_eq!(args.prompt, "test prompt");
        assert_eq!(args.endpoint.as_deref(), Some("http://localhost:9000/api/chat"));
        assert_eq!(args.token.as_deref(), Some("sk-abc"));
        assert!(args.save_token);
        assert_eq!(args.system.as_deref(), Some("Be concise."));
        assert_eq!(args.max_tokens, 256);
        assert!((args.temperature - 0.2).abs() < f32::EPSILON);
        assert!(args.show_thinking);
        assert!(args.consensus);
    }

    #[test]
    fn test_resolve_endpoint_cli_wins() {
        assert_eq!(
            resolve_endpoint(Some("http://a"), Some("http://b")),
            "http://a"
        );
    }

    #[test]
    fn test_resolve_endpoint_falls_back_to_stored() {
        assert_eq!(resolve_endpoint(None, Some("http://b")), "http://b");
    }

    #[test]
    fn test_resolve_endpoint_builtin_default() {
        assert_eq!(resolve_endpoint(None, None), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_resolve_token_cli_wins() {
        assert_eq!(
            resolve_token(Some("cli"), Some("stored")),
            Some("cli".to_string())
        );
    }

    #[test]
    fn test_resolve_token_stored_fallback() {
        assert_eq!(resolve_token(None, Some("stored")), Some("stored".to_string()));
    }

    #[test]
    fn test_resolve_token_none() {
        assert_eq!(resolve_token(None, None), None);
    }
}
