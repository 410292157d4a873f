use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use lox_interpreter as lox;

use lox::ast_printer::AstPrinter;
use lox::error::LoxError;
use lox::interpreter::Interpreter;
use lox::parser::Parser;
use lox::resolver::Resolver;
use lox::scanner;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: Option<PathBuf>,

        /// Emit the token stream as a JSON array instead of one per line
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse { filename: Option<PathBuf> },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: Option<PathBuf> },

    /// Runs input from a file as a Lox program, or starts a REPL without one
    Run { filename: Option<PathBuf> },
}

/// A memory-mapped script file.  Empty files are legal and map to an empty
/// buffer (mapping zero bytes is an error on most platforms).
struct SourceBuf(Option<Mmap>);

impl SourceBuf {
    fn bytes(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }
}

/// Memory-map the contents of a script file.
fn map_file(filename: &PathBuf) -> Result<SourceBuf> {
    info!("Mapping file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let len: u64 = file
        .metadata()
        .context(format!("Failed to stat file {:?}", filename))?
        .len();

    if len == 0 {
        return Ok(SourceBuf(None));
    }

    // SAFETY: the mapping is read-only and dropped before the process exits.
    let mmap =
        unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;

    info!("Mapped {} bytes from {:?}", len, filename);

    Ok(SourceBuf(Some(mmap)))
}

fn init_logger() -> Result<()> {
    // Create or open the log file
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    // Configure env_logger to write to file with module and source line
    Builder::new()
        .format(|buf, record| {
            // Strip 'lox_interpreter::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("lox_interpreter::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Print every static diagnostic to stderr.  Returns true if any were seen.
fn report_all(diagnostics: &[LoxError]) -> bool {
    for e in diagnostics {
        eprintln!("{}", e);
    }

    !diagnostics.is_empty()
}

/// Scan → parse → resolve → interpret one program.  Static errors exit with
/// code 65, runtime errors with 70.
fn run_program(src: &[u8]) {
    let (tokens, scan_errors) = scanner::scan(src);
    let (program, parse_errors) = Parser::new(&tokens).parse();

    let mut had_static_error: bool = report_all(&scan_errors);
    had_static_error |= report_all(&parse_errors);

    // Resolution still runs over the partial program so its diagnostics are
    // reported in the same pass, but nothing is executed after any error.
    let (locals, resolve_errors) = Resolver::new().resolve(&program);
    had_static_error |= report_all(&resolve_errors);

    if had_static_error {
        debug!("Static errors present, skipping execution");
        std::process::exit(65);
    }

    let mut interpreter = Interpreter::new();
    if let Err(e) = interpreter.interpret(&program, locals) {
        eprintln!("{}", e);
        std::process::exit(70);
    }
}

/// One line of interactive input.  A bare expression is evaluated and
/// echoed; anything else runs as statements against the shared interpreter,
/// so definitions persist across lines.
fn run_line(interpreter: &mut Interpreter, src: &[u8]) {
    let (tokens, scan_errors) = scanner::scan(src);
    if report_all(&scan_errors) {
        return;
    }

    if let Ok(expr) = Parser::new(&tokens).parse_expression() {
        match interpreter.evaluate(&expr) {
            Ok(value) => println!("{}", value),
            Err(e) => eprintln!("{}", e),
        }
        return;
    }

    let (program, parse_errors) = Parser::new(&tokens).parse();
    if report_all(&parse_errors) {
        return;
    }

    let (locals, resolve_errors) = Resolver::new().resolve(&program);
    if report_all(&resolve_errors) {
        return;
    }

    if let Err(e) = interpreter.interpret(&program, locals) {
        eprintln!("{}", e);
    }
}

/// Interactive shell: read a line, run it, repeat until EOF.  Errors are
/// reported and the session continues.
fn run_prompt() -> Result<()> {
    println!("Lox interactive shell (ctrl-d to exit)");

    let mut interpreter = Interpreter::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("lox> ");
        io::stdout().flush().context("Failed to flush prompt")?;

        line.clear();
        let read: usize = stdin
            .lock()
            .read_line(&mut line)
            .context("Error reading input")?;
        if read == 0 {
            break; // EOF
        }

        let trimmed: &str = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        run_line(&mut interpreter, trimmed.as_bytes());
    }

    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename, json } => match filename {
            Some(filename) => {
                info!("Running Tokenize subcommand");
                let buf = map_file(&filename)?;
                let (tokens, errors) = scanner::scan(buf.bytes());

                if json {
                    let rendered: String = serde_json::to_string_pretty(&tokens)
                        .context("Failed to serialize tokens")?;
                    println!("{}", rendered);
                } else {
                    for token in &tokens {
                        println!("{}", token);
                    }
                }

                if report_all(&errors) {
                    debug!("Tokenization failed, exiting with code 65");
                    std::process::exit(65);
                }

                info!("Tokenization completed successfully");
            }
            None => {
                info!("No filepath provided for Tokenize");

                println!("No input filepath was provided. Exiting...");

                std::process::exit(0);
            }
        },

        Commands::Parse { filename } => match filename {
            Some(filename) => {
                info!("Running Parse subcommand");
                let buf = map_file(&filename)?;
                let (tokens, scan_errors) = scanner::scan(buf.bytes());

                if report_all(&scan_errors) {
                    std::process::exit(65);
                }

                match Parser::new(&tokens).parse_expression() {
                    Ok(expr) => {
                        let ast_str: String = AstPrinter::print(&expr);

                        debug!("AST: {}", ast_str);
                        println!("{}", ast_str);
                    }

                    Err(e) => {
                        eprintln!("{}", e);
                        std::process::exit(65);
                    }
                }

                info!("Parse subcommand completed");
            }
            None => {
                info!("No filepath provided for Parse");
                println!("No input filepath was provided. Exiting...");
                std::process::exit(0);
            }
        },

        Commands::Evaluate { filename } => match filename {
            Some(filename) => {
                info!("Running Evaluate subcommand");

                let buf = map_file(&filename)?;
                let (tokens, scan_errors) = scanner::scan(buf.bytes());

                if report_all(&scan_errors) {
                    std::process::exit(65);
                }

                let mut interpreter = Interpreter::new();

                match Parser::new(&tokens).parse_expression() {
                    Ok(expr) => match interpreter.evaluate(&expr) {
                        Ok(value) => {
                            debug!("Evaluated to: {}", value);
                            println!("{}", value);
                        }

                        Err(e) => {
                            eprintln!("{}", e);
                            std::process::exit(70);
                        }
                    },

                    Err(e) => {
                        eprintln!("{}", e);
                        std::process::exit(65);
                    }
                }

                info!("Evaluate subcommand completed");
            }

            None => {
                info!("No filepath provided for Evaluate");
                println!("No input filepath was provided. Exiting...");
                std::process::exit(0);
            }
        },

        Commands::Run { filename } => match filename {
            Some(filename) => {
                info!("Running Run subcommand");
                let buf = map_file(&filename)?;

                run_program(buf.bytes());
            }

            None => {
                info!("No filepath provided for Run, starting REPL");
                run_prompt()?;
            }
        },
    }

    Ok(())
}
