use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use statemaker::config::{self, BuildConfig};
use statemaker::describe::{describe_game, CompileReport};
use statemaker::dsl::context::CompilerContext;
use statemaker::dsl::{codegen, compile_source, validate};
use statemaker::error::AppError;
use statemaker::image::FlashImage;
use statemaker::util::parse_address;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "statemaker", about = "Badge game state-sheet compiler", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Build config (JSON); command-line flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output a JSON compile report instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Log compiler progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a state sheet and write the requested outputs
    Compile {
        statefile: PathBuf,
        #[command(flatten)]
        switches: Switches,
        /// Flat binary flash image
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
        /// C symbol header ("-" for stdout)
        #[arg(short = 'c', long)]
        symbols: Option<PathBuf>,
        /// GraphViz state graph
        #[arg(short = 'd', long)]
        state_dot: Option<PathBuf>,
        /// GraphViz action graph
        #[arg(short = 'a', long)]
        action_dot: Option<PathBuf>,
        /// Text pool address in the image
        #[arg(long, value_parser = parse_address)]
        text_addr: Option<u32>,
        /// Action table address in the image
        #[arg(long, value_parser = parse_address)]
        action_addr: Option<u32>,
        /// State table address in the image
        #[arg(long, value_parser = parse_address)]
        state_addr: Option<u32>,
    },
    /// Compile and report problems without writing anything
    Check {
        statefile: PathBuf,
        #[command(flatten)]
        switches: Switches,
    },
    /// Human-readable description of the compiled game
    Describe {
        statefile: PathBuf,
        #[command(flatten)]
        switches: Switches,
    },
}

#[derive(Args)]
struct Switches {
    /// Synthesize stub states for undeclared transition targets (development only)
    #[arg(long)]
    allow_implicit: bool,
    /// Remove NOPs that only rejoin text alternatives
    #[arg(long)]
    cull_nops: bool,
    /// Don't warn about wrapped frames holding a single word
    #[arg(long)]
    no_wrap_warnings: bool,
}

impl Switches {
    fn apply(&self, config: &mut BuildConfig) {
        config.compile.allow_implicit |= self.allow_implicit;
        config.compile.cull_nops |= self.cull_nops;
        config.compile.suppress_single_word_warning |= self.no_wrap_warnings;
    }
}

// ── Compilation ──────────────────────────────────────────────────

/// Compile a sheet, printing warnings. On a FATAL the error carries the
/// warnings found before it, rendered ahead of the FATAL itself.
fn compile_file(path: &Path, config: &BuildConfig, json: bool) -> Result<(CompilerContext, CompileReport), AppError> {
    let file = path.display().to_string();
    let source = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;

    let ctx = compile_source(&source, &config.compile).map_err(|failure| AppError::Compile {
        file: file.clone(),
        failure,
    })?;

    let report = CompileReport::new(&file, &ctx);
    if !json {
        for warning in &report.warnings {
            eprintln!("{warning}");
        }
    }
    tracing::info!(states = report.states, actions = report.actions, "compiled {file}");
    Ok((ctx, report))
}

fn write_text(path: &Path, contents: &str) -> Result<(), AppError> {
    if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        return stdout
            .write_all(contents.as_bytes())
            .map_err(|e| AppError::io(path, e));
    }
    std::fs::write(path, contents).map_err(|e| AppError::io(path, e))
}

/// Produce every requested artifact in memory, then write them all.
fn write_outputs(ctx: &CompilerContext, report: &CompileReport, config: &BuildConfig) -> Result<(), AppError> {
    let game = codegen::generate(ctx, &config.placement).map_err(|diagnostic| AppError::Compile {
        file: report.file.clone(),
        failure: diagnostic.into(),
    })?;

    let image = match &config.outputs.image {
        Some(_) => {
            let mut image = FlashImage::new();
            image.put("text pool", config.placement.text_pool_addr, game.text_pool)?;
            image.put("action table", config.placement.action_table_addr, game.action_table)?;
            image.put("state table", config.placement.state_table_addr, game.state_table)?;
            Some(image)
        }
        None => None,
    };

    if let (Some(path), Some(image)) = (&config.outputs.image, &image) {
        image.write(path)?;
    }
    if let Some(path) = &config.outputs.symbols {
        write_text(path, &game.symbols.to_header())?;
    }
    if let Some(path) = &config.outputs.state_dot {
        write_text(path, &validate::to_dot(&validate::state_graph(ctx)))?;
    }
    if let Some(path) = &config.outputs.action_dot {
        write_text(path, &validate::to_dot(&validate::action_graph(ctx)))?;
    }
    Ok(())
}

fn print_report(report: &CompileReport, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
    } else {
        eprintln!(
            "{}: {} states, {} actions, {} strings ({} aux), {} warnings",
            report.file,
            report.states,
            report.actions,
            report.text_main + report.text_aux,
            report.text_aux,
            report.warnings.len()
        );
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => BuildConfig::default(),
    };

    match cli.command {
        Commands::Compile {
            statefile,
            switches,
            output,
            symbols,
            state_dot,
            action_dot,
            text_addr,
            action_addr,
            state_addr,
        } => {
            switches.apply(&mut config);
            let outputs = &mut config.outputs;
            outputs.image = output.or(outputs.image.take());
            outputs.symbols = symbols.or(outputs.symbols.take());
            outputs.state_dot = state_dot.or(outputs.state_dot.take());
            outputs.action_dot = action_dot.or(outputs.action_dot.take());
            let placement = &mut config.placement;
            placement.text_pool_addr = text_addr.unwrap_or(placement.text_pool_addr);
            placement.action_table_addr = action_addr.unwrap_or(placement.action_table_addr);
            placement.state_table_addr = state_addr.unwrap_or(placement.state_table_addr);

            let (ctx, report) = compile_file(&statefile, &config, cli.json)?;
            write_outputs(&ctx, &report, &config)?;
            print_report(&report, cli.json);
        }
        Commands::Check { statefile, switches } => {
            switches.apply(&mut config);
            let (_, report) = compile_file(&statefile, &config, cli.json)?;
            print_report(&report, cli.json);
        }
        Commands::Describe { statefile, switches } => {
            switches.apply(&mut config);
            let (ctx, report) = compile_file(&statefile, &config, cli.json)?;
            if cli.json {
                print_report(&report, true);
            } else {
                println!("{}", describe_game(&ctx));
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}
