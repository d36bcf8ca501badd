//! Standalone checker for locale files.
//!
//! Verifies that every translation carries every key of the default language
//! with the same placeholders.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use pocket_userbot::locale::{DEFAULT_LANGUAGE, Locales};

/// Locale consistency checker.
#[derive(Parser, Debug)]
#[command(name = "check_locales")]
#[command(about = "Checks userbot locale files against the default language")]
#[command(version)]
struct Args {
    /// Directory of `<code>.json` files to check instead of the bundled ones.
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Check only this language.
    #[arg(short, long)]
    lang: Option<String>,

    /// List every key of each checked language.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let locales = match &args.dir {
        Some(dir) => load_dir(dir),
        None => Locales::bundled().map_err(|e| e.to_string()),
    };
    let locales = match locales {
        Ok(l) => l,
        Err(e) => {
            eprintln!("✗ Failed to load locales: {e}");
            return ExitCode::FAILURE;
        }
    };

    let languages: Vec<String> = match args.lang {
        Some(lang) if !locales.has_language(&lang) => {
            eprintln!("✗ Unknown language: {lang}");
            return ExitCode::FAILURE;
        }
        Some(lang) => vec![lang],
        None => locales
            .available()
            .into_iter()
            .filter(|lang| lang != DEFAULT_LANGUAGE)
            .collect(),
    };

    let reference_keys = locales.entries(DEFAULT_LANGUAGE).len();
    println!("Reference: {DEFAULT_LANGUAGE} ({reference_keys} keys)\n");

    let mut failed = 0;
    for lang in &languages {
        let issues = locales.check(lang);
        if issues.is_empty() {
            println!("✓ {lang} ({})", locales.language_name(lang));
        } else {
            failed += 1;
            println!("✗ {lang}: {} issue(s)", issues.len());
            for issue in &issues {
                println!("  - {issue}");
            }
        }

        if args.verbose {
            for (key, template) in locales.entries(lang) {
                println!("    {key} = {template:?}");
            }
        }
    }

    println!();
    if failed == 0 {
        println!("✓ All {} language(s) are consistent", languages.len());
        ExitCode::SUCCESS
    } else {
        println!("✗ {failed} of {} language(s) have issues", languages.len());
        ExitCode::FAILURE
    }
}

/// Reads every `<code>.json` file in `dir`.
fn load_dir(dir: &Path) -> Result<Locales, String> {
    let entries = std::fs::read_dir(dir).map_err(|e| format!("{}: {e}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let Some(code) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let text =
            std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))?;
        files.push((code.to_owned(), text));
    }

    let sources: Vec<(&str, &str)> = files
        .iter()
        .map(|(code, text)| (code.as_str(), text.as_str()))
        .collect();
    Locales::from_sources(&sources).map_err(|e| e.to_string())
}
