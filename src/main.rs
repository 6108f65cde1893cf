use std::collections::HashMap;
use std::io::{self, Write};

use clap::Parser;
use colored::*;
use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

use chorus::cli::{self, Args};
use chorus::consensus::{self, ModelResponse};
use chorus::error::ChorusError;
use chorus::prefs::Prefs;
use chorus::protocol::ChatMessage;
use chorus::thinking::ThinkingAccumulator;
use chorus::{fan_out, ChatClient, ModelStreamEvent, StreamEvent, StreamOptions};

/// Colors assigned to models in fan-out order.
static MODEL_COLORS: Lazy<Vec<Color>> = Lazy::new(|| {
    vec![
        Color::BrightCyan,
        Color::BrightYellow,
        Color::BrightMagenta,
        Color::BrightGreen,
        Color::BrightBlue,
        Color::BrightRed,
    ]
});

/// Per-model render state while streams are live.
struct Panel {
    color: Color,
    acc: ThinkingAccumulator,
    result: Option<Result<String, String>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let prefs_path = Prefs::default_path();
    let mut prefs = match &prefs_path {
        Some(path) => Prefs::load(path)?,
        None => Prefs::default(),
    };

    if args.save_token {
        match (&args.token, &prefs_path) {
            (Some(token), Some(path)) => {
                prefs.api_token = Some(token.clone());
                prefs.save(path)?;
                eprintln!("{}", "token saved".bright_green());
            }
            (None, _) => return Err("--save-token requires --token".into()),
            (_, None) => return Err("no config directory available on this platform".into()),
        }
    }

    let endpoint = cli::resolve_endpoint(args.endpoint.as_deref(), prefs.endpoint.as_deref());
    let token = cli::resolve_token(args.token.as_deref(), prefs.api_token.as_deref());
    let show_thinking = args.show_thinking || prefs.show_thinking;

    let client = ChatClient::new(endpoint, token);
    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(ChatMessage::system(system.clone()));
    }
    messages.push(ChatMessage::user(args.prompt.clone()));

    let opts = StreamOptions { max_tokens: args.max_tokens, temperature: args.temperature };

    print_header(&args, &client);

    let mut panels: HashMap<String, Panel> = args
        .models
        .iter()
        .enumerate()
        .map(|(i, model)| {
            (
                model.clone(),
                Panel {
                    color: MODEL_COLORS[i % MODEL_COLORS.len()],
                    acc: ThinkingAccumulator::new(),
                    result: None,
                },
            )
        })
        .collect();
    let multi = args.models.len() > 1;

    let (mut rx, cancel) = fan_out(&client, &args.models, &messages, &opts);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                eprintln!("\n{}", "cancelled".bright_yellow());
                return Ok(());
            }
            received = rx.recv() => {
                let Some(ModelStreamEvent { model, event }) = received else {
                    break;
                };
                let Some(panel) = panels.get_mut(&model) else {
                    continue;
                };
                render_event(&model, event, panel, multi, show_thinking);
            }
        }
    }

    println!("\n{}", "=".repeat(50).bright_blue());
    let results: HashMap<String, Result<String, String>> = panels
        .into_iter()
        .map(|(model, panel)| {
            let fallback = panel.acc.answer().to_string();
            let result = panel.result.unwrap_or(Ok(fallback));
            (model, result)
        })
        .collect();

    let succeeded = results.values().filter(|r| r.is_ok()).count();
    println!("Complete! {} of {} model streams succeeded.", succeeded, results.len());

    if succeeded == 0 {
        return Err(Box::new(ChorusError::AllModelsFailed) as Box<dyn std::error::Error>);
    }

    if args.consensus {
        let responses: Vec<ModelResponse> = args
            .models
            .iter()
            .filter_map(|model| match results.get(model) {
                Some(Ok(text)) => Some(ModelResponse::new(model.clone(), text.clone())),
                _ => None,
            })
            .collect();
        match consensus::analyze(&responses) {
            Ok(report) => {
                println!("\n{}", "Consensus".bright_green().bold());
                if report.consensus.is_empty() {
                    println!("  (none)");
                }
                for point in &report.consensus {
                    println!("  • {}", point);
                }
                println!("\n{}", "Unique per model".bright_green().bold());
                for model in &args.models {
                    if let Some(points) = report.unique.get(model) {
                        println!("  {}:", model.bright_white());
                        if points.is_empty() {
                            println!("    (none)");
                        }
                        for point in points {
                            println!("    • {}", point);
                        }
                    }
                }
            }
            Err(e) => eprintln!("{} {}", "analysis failed:".bright_red(), e),
        }
    }

    Ok(())
}

fn render_event(
    model: &str,
    event: StreamEvent,
    panel: &mut Panel,
    multi: bool,
    show_thinking: bool,
) {
    match event {
        StreamEvent::Start => {
            if multi {
                println!("\n[{}]", model.color(panel.color).bold());
            }
        }
        StreamEvent::Chunk { text } => {
            let parsed = panel.acc.push(&text);
            if show_thinking && !parsed.thinking.is_empty() {
                print!("{}", parsed.thinking.color(panel.color).dimmed());
            }
            if !parsed.answer.is_empty() {
                if multi {
                    print!("{}", parsed.answer.color(panel.color));
                } else {
                    print!("{}", parsed.answer);
                }
            }
            let _ = io::stdout().flush();
        }
        StreamEvent::Done { final_text } => {
            let parsed = panel.acc.finish();
            if show_thinking && !parsed.thinking.is_empty() {
                print!("{}", parsed.thinking.color(panel.color).dimmed());
            }
            if !parsed.answer.is_empty() {
                if multi {
                    print!("{}", parsed.answer.color(panel.color));
                } else {
                    print!("{}", parsed.answer);
                }
            }
            let _ = io::stdout().flush();
            let answer = panel.acc.answer();
            let text = if answer.is_empty() {
                final_text.unwrap_or_default()
            } else {
                answer.to_string()
            };
            panel.result = Some(Ok(text));
            if multi {
                println!("\n[{}] {}", model.color(panel.color), "done".bright_green());
            }
        }
        StreamEvent::Error { message } => {
            println!(
                "\n[{}] {} {}",
                model.color(panel.color),
                "error:".bright_red(),
                message
            );
            panel.result = Some(Err(message));
        }
    }
}

fn print_header(args: &Args, client: &ChatClient) {
    println!("{}", "CHORUS".bright_cyan().bold());
    println!("{}: {}", "Endpoint".bright_yellow(), client.endpoint());
    println!("{}: {}", "Models".bright_yellow(), args.models.join(", "));
    println!("{}: {}", "Prompt".bright_yellow(), args.prompt);
    if args.show_thinking {
        println!(
            "{}: {}",
            "Thinking".bright_green(),
            "shown dimmed while streaming".bright_green()
        );
    }
    println!("{}", "=".repeat(50).bright_blue());
}
