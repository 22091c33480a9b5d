use anyhow::{Context, Result, bail};
use content_bridge_config::Config;
use content_bridge_engine::parser::{
    self, analyze_structured, from_json, html_to_structured, markdown_to_structured,
    structured_to_html, structured_to_markdown, text_to_structured, to_json,
};
use content_bridge_engine::surfaces::{NovelDocument, NovelEditor, TextareaSurface, TiptapEditor};
use content_bridge_engine::{
    AdapterOptions, EditorFactory, EditorHandle, EditorType, SelectionManager, StructuredContent,
    StructuredContentHandler, process_ai_response,
};
use std::path::{Path, PathBuf};
use std::{env, fs, process};

const USAGE: &str = "\
Usage:
  content-bridge-cli convert <file> <html|markdown|text|json>
  content-bridge-cli stats <file>
  content-bridge-cli links <file>
  content-bridge-cli replace <file> <search> <replacement> [--all]
  content-bridge-cli rewrite <original-file> <rewritten-file>

Options:
  --config <path>   use this config file instead of the default location";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Html,
    Markdown,
    Text,
    Json,
}

impl Format {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "html" => Some(Self::Html),
            "markdown" | "md" => Some(Self::Markdown),
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Input format from the file extension; anything unknown is plain text.
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("html" | "htm") => Self::Html,
            Some("md" | "markdown") => Self::Markdown,
            Some("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = load_config(&mut args)?;

    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        process::exit(1);
    };

    match (command.as_str(), rest) {
        ("convert", [file, target]) => {
            let Some(target) = Format::from_name(target) else {
                bail!("Unknown output format '{target}'");
            };
            let doc = read_structured(Path::new(file))?;
            println!("{}", render(&doc, target)?);
        }
        ("stats", [file]) => {
            let doc = read_structured(Path::new(file))?;
            let handler = StructuredContentHandler::new(&doc);
            println!("{}", serde_json::to_string_pretty(&handler.get_statistics())?);
            println!("{}", serde_json::to_string_pretty(&analyze_structured(&doc))?);
            let report = handler.validate();
            for error in &report.errors {
                println!("error: {error}");
            }
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
        }
        ("links", [file]) => {
            let handler = StructuredContentHandler::new(&read_structured(Path::new(file))?);
            for link in handler.extract_links() {
                println!("link\t{}\t{}", link.href, link.text);
            }
            for image in handler.extract_images() {
                println!("image\t{}\t{}", image.src, image.alt);
            }
        }
        ("replace", [file, search, replacement, flags @ ..]) => {
            let all = match flags {
                [] => false,
                [flag] if flag == "--all" => true,
                _ => bail!("Unexpected arguments: {}", flags.join(" ")),
            };
            let (content, count) = replace_in_file(Path::new(file), search, replacement, all, &config)?;
            println!("{content}");
            eprintln!("{count} replacement(s)");
        }
        ("rewrite", [original, rewritten]) => {
            let original = read_file(Path::new(original))?;
            let rewritten = read_file(Path::new(rewritten))?;
            let processed = process_ai_response(&original, &rewritten, config.preserve_formatting);
            println!("{}", processed.processed_text);
            for warning in &processed.warnings {
                eprintln!("warning: {warning}");
            }
            for error in &processed.errors {
                eprintln!("error: {error}");
            }
            if !processed.errors.is_empty() {
                process::exit(2);
            }
        }
        _ => {
            eprintln!("{USAGE}");
            process::exit(1);
        }
    }

    Ok(())
}

/// Strip a `--config <path>` pair from `args` and load the config it names,
/// or the default config file when absent.
fn load_config(args: &mut Vec<String>) -> Result<Config> {
    let explicit = match args.iter().position(|arg| arg == "--config") {
        Some(index) => {
            if index + 1 >= args.len() {
                bail!("--config needs a path");
            }
            let raw = PathBuf::from(args.remove(index + 1));
            args.remove(index);
            Some(Config::expand_path(&raw).unwrap_or(raw))
        }
        None => None,
    };

    let config_path = explicit.unwrap_or_else(Config::config_path);
    log::debug!("Config path: {}", config_path.display());
    match Config::load_from_path(&config_path)? {
        Some(config) => {
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_structured(path: &Path) -> Result<StructuredContent> {
    let content = read_file(path)?;
    let doc = match Format::from_path(path) {
        Format::Html => html_to_structured(&content),
        Format::Markdown => markdown_to_structured(&content),
        Format::Json => from_json(&content)
            .with_context(|| format!("Invalid structured content in {}", path.display()))?,
        Format::Text => text_to_structured(&content),
    };
    Ok(doc)
}

fn render(doc: &StructuredContent, format: Format) -> Result<String> {
    Ok(match format {
        Format::Html => structured_to_html(doc),
        Format::Markdown => structured_to_markdown(doc),
        Format::Text => parser::structured_to_text(doc),
        Format::Json => to_json(doc)?,
    })
}

/// Run a replacement through a managed adapter. The backend is textarea
/// unless the config names another one.
fn replace_in_file(
    path: &Path,
    search: &str,
    replacement: &str,
    all: bool,
    config: &Config,
) -> Result<(String, usize)> {
    let text = read_file(path)?;
    let editor_type = config
        .default_editor
        .as_deref()
        .and_then(EditorType::parse)
        .unwrap_or(EditorType::Textarea);
    let handle = match editor_type {
        EditorType::Textarea => EditorHandle::textarea(TextareaSurface::new(&text)),
        EditorType::Tiptap => EditorHandle::tiptap(TiptapEditor::from_text(&text)),
        EditorType::Novel => EditorHandle::novel(NovelEditor::new(NovelDocument::from_text(&text))),
    };
    let options = AdapterOptions {
        poll_interval: Some(config.poll_interval(editor_type.as_str())),
        context_radius: config.context_radius,
    };
    let adapter = EditorFactory::new(options).create(handle, Some(editor_type))?;

    let mut manager = SelectionManager::with_context_radius(config.context_radius);
    manager.register_adapter("file", adapter)?;
    let count = manager.replace_text(search, replacement, all)?;
    let content = manager.get_content()?;
    manager.destroy();
    Ok((content, count))
}
