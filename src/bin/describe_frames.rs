//! describe_frames - send saved frames to the remote vision API.
//!
//! Accepts JPEG files or directories; directories contribute every `.jpg`
//! / `.jpeg` they contain, in file-name order. Prints `path: text` per image.
//! Requires `SIGHTLINE_API_KEY`.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use sightline::describe::{DESCRIBE_PROMPT, EXTRACT_TEXT_PROMPT};
use sightline::{ui::Ui, DescribeClient, DescribeConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Instruction {
    /// Extract visible signage text
    Extract,
    /// Short scene description
    Describe,
}

#[derive(Parser, Debug)]
#[command(
    name = "describe_frames",
    about = "Describe or read text from saved frames with a remote vision model"
)]
struct Args {
    /// JPEG files or directories of JPEGs
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Built-in instruction to send with each image
    #[arg(long, value_enum, default_value = "extract")]
    instruction: Instruction,

    /// Custom instruction text (overrides --instruction)
    #[arg(long, value_name = "TEXT")]
    prompt: Option<String>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let config = DescribeConfig::load()?;
    let client = DescribeClient::new(config);
    let instruction = match (&args.prompt, args.instruction) {
        (Some(prompt), _) => prompt.as_str(),
        (None, Instruction::Extract) => EXTRACT_TEXT_PROMPT,
        (None, Instruction::Describe) => DESCRIBE_PROMPT,
    };

    let images = {
        let _stage = ui.stage("Collect images");
        collect_images(&args.paths)?
    };
    if images.is_empty() {
        return Err(anyhow!("no .jpg images found"));
    }
    log::info!("describing {} image(s) via {}", images.len(), client.endpoint());

    let mut failures = 0usize;
    for path in &images {
        let description = client
            .describe_file(path, instruction)
            .with_context(|| format!("describing {}", path.display()))?;
        if description.is_failed() {
            failures += 1;
        }
        println!("{}: {}", path.display(), description.into_text());
    }
    if failures > 0 {
        log::warn!("{} of {} request(s) were rejected", failures, images.len());
    }
    Ok(())
}

fn collect_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("reading directory {}", path.display()))?
            {
                let entry_path = entry?.path();
                if entry_path.is_file() && is_jpeg(&entry_path) {
                    found.push(entry_path);
                }
            }
            found.sort();
            images.extend(found);
        } else if path.is_file() {
            images.push(path.clone());
        } else {
            return Err(anyhow!("no such file or directory: {}", path.display()));
        }
    }
    Ok(images)
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}
