use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, ValueEnum};
use log::{LevelFilter, debug, info, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mxmap::{DEFAULT_MAP_NAME, DiagramDocument, ImageMap, MAP_NAME_ENV, extract_diagram_xml};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "mxmap",
    about = "Generate HTML image maps for the links in rendered draw.io diagrams."
)]
pub struct MapArgs {
    /// Diagram to read: draw.io XML, an exported PNG or SVG, or a data URI. Use '-' for stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Name of the generated map (defaults to $MXMAP_MAP_NAME, then the input file stem).
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Output format (defaults to the output file extension or markup).
    #[arg(short = 'f', long = "format")]
    format: Option<OutputFormat>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Log level: off, error, warn, info, debug or trace.
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Markup,
    Json,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
        {
            Some(ext) if ext == "json" => Some(OutputFormat::Json),
            Some(ext) if matches!(ext.as_str(), "html" | "htm" | "xml" | "txt") => {
                Some(OutputFormat::Markup)
            }
            _ => None,
        }
    }
}

pub fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let map_args = match args.get(1).map(|s| s.as_str()) {
        Some("render") => MapArgs::parse_from(
            std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
        ),
        _ => MapArgs::parse_from(args),
    };

    init_logging(&map_args.log_level);
    debug!(args:? = map_args; "Parsed arguments");
    run_map(map_args)
}

fn init_logging(level: &str) {
    let log_level = LevelFilter::from_str(level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {level}. Using 'warn' instead.");
        LevelFilter::Warn
    });

    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(log_level)
        .init();
}

fn run_map(cli: MapArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref())?;
    let format = determine_format(cli.format, &output_dest);
    let name = resolve_map_name(cli.name.as_deref(), &input_source);

    let bytes = load_input(&input_source)?;
    let xml = extract_diagram_xml(&bytes).context("failed to locate the draw.io diagram")?;
    let document = DiagramDocument::parse(&xml).context("failed to read the draw.io diagram")?;
    info!(cells = document.len(), name = name.as_str(); "Loaded diagram");

    let image_map = ImageMap::build(&document, &name);
    if image_map.is_empty() && !cli.quiet {
        warn!("diagram contains no linked cells");
    }

    let output_bytes = match format {
        OutputFormat::Markup => image_map.to_markup().into_bytes(),
        OutputFormat::Json => serde_json::to_vec_pretty(&image_map)
            .context("failed to serialize image map as JSON")?,
    };

    write_output(output_dest, &output_bytes, cli.quiet)
}

fn resolve_map_name(explicit: Option<&str>, input: &InputSource) -> String {
    if let Some(name) = explicit.filter(|name| !name.trim().is_empty()) {
        return name.to_string();
    }

    if let Ok(name) = std::env::var(MAP_NAME_ENV) {
        if !name.trim().is_empty() {
            return name;
        }
    }

    match input {
        InputSource::File(path) => path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.split('.').next())
            .filter(|stem| !stem.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_MAP_NAME.to_string()),
        InputSource::Stdin => DEFAULT_MAP_NAME.to_string(),
    }
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(output: Option<&str>) -> Result<OutputDestination> {
    match output {
        None | Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
    }
}

fn determine_format(preference: Option<OutputFormat>, output: &OutputDestination) -> OutputFormat {
    if let Some(fmt) = preference {
        return fmt;
    }

    match output {
        OutputDestination::Stdout => OutputFormat::Markup,
        OutputDestination::File(path) => {
            OutputFormat::from_path(path).unwrap_or(OutputFormat::Markup)
        }
    }
}

fn load_input(source: &InputSource) -> Result<Vec<u8>> {
    let bytes = match source {
        InputSource::Stdin => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
        InputSource::File(path) => {
            fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        bail!("no diagram supplied");
    }
    Ok(bytes)
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Generated image map -> {}", path.display());
            }
        }
    }
    Ok(())
}
