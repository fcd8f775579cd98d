//! Gridform CLI - load a form definition, apply values and report
//!
//! Usage: `gridform <definition.json> [path=value ...] [--width N] [--expanded]`

use anyhow::{bail, Context, Result};
use gridform::{Form, FormCallbacks, FormDefinition};
use serde_json::{json, Value};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default)]
struct Args {
    definition: PathBuf,
    assignments: Vec<(String, Value)>,
    width: Option<f64>,
    expanded: bool,
}

/// Values parse as JSON, falling back to a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut definition = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--width" => {
                let raw = args.next().context("--width needs a value")?;
                parsed.width = Some(raw.parse().with_context(|| format!("bad width `{raw}`"))?);
            }
            "--expanded" => parsed.expanded = true,
            _ => match arg.split_once('=') {
                Some((path, raw)) => parsed.assignments.push((path.to_string(), parse_value(raw))),
                None if definition.is_none() => definition = Some(PathBuf::from(arg)),
                None => bail!("unexpected argument `{arg}`"),
            },
        }
    }

    parsed.definition = definition
        .context("usage: gridform <definition.json> [path=value ...] [--width N] [--expanded]")?;
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridform=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let definition = FormDefinition::from_file(&args.definition)
        .with_context(|| format!("loading {}", args.definition.display()))?;
    let form = Form::from_definition(&definition, FormCallbacks::new())?;

    if let Some(width) = args.width {
        form.layout_engine().init(width);
    }
    form.set_expanded(args.expanded);

    for (path, value) in args.assignments {
        form.set_field_value(&path, value).await?;
    }
    let validation = form.validate().await;

    let report = json!({
        "values": form.fields_value(),
        "formState": form.form_state(),
        "errors": validation.errors,
        "warnings": validation.warnings,
        "layout": form.layout_engine().layout_result(),
        "grouped": form.layout_engine().grouped_layout(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    form.destroy();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["form.json", "age=42", "name=Ada", "--width", "900", "--expanded"]).unwrap();

        assert_eq!(parsed.definition, PathBuf::from("form.json"));
        assert_eq!(
            parsed.assignments,
            vec![
                ("age".to_string(), json!(42)),
                ("name".to_string(), json!("Ada")),
            ]
        );
        assert_eq!(parsed.width, Some(900.0));
        assert!(parsed.expanded);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&[]).is_err());
        assert!(args(&["a.json", "b.json"]).is_err());
        assert!(args(&["a.json", "--width", "wide"]).is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("[1,2]"), json!([1, 2]));
        assert_eq!(parse_value("hello"), json!("hello"));
    }
}
