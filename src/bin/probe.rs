use anyhow::{bail, Context};
use serde::Serialize;
use std::io::Read;
use veraz_lib::api::{detect_text, humanize_text};

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeOutput<T: Serialize> {
    mode: &'static str,
    input_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<veraz_lib::api::CommandError>,
}

fn print_outcome<T: Serialize>(
    mode: &'static str,
    text: &str,
    outcome: Result<T, veraz_lib::api::CommandError>,
) -> anyhow::Result<bool> {
    let ok = outcome.is_ok();
    let (result, error) = match outcome {
        Ok(r) => (Some(r), None),
        Err(e) => (None, Some(e)),
    };
    let output = ProbeOutput {
        mode,
        input_preview: preview(text, 80),
        result,
        error,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ok)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        eprintln!(
            "Usage:\n  cargo run --bin probe -- [--file <path>] [--humanize]\n\nNotes:\n  - Reads text from stdin when --file is omitted.\n  - Model settings come from the config file and VERAZ_* environment variables."
        );
        return Ok(());
    }

    veraz_lib::init_logging();

    let text = match parse_arg_value(&args, "--file") {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let ok = if has_flag(&args, "--humanize") {
        print_outcome("humanize", &text, humanize_text(text.clone()).await)?
    } else {
        print_outcome("detect", &text, detect_text(text.clone()).await)?
    };

    if !ok {
        bail!("pipeline returned a failure");
    }
    Ok(())
}
