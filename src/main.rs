// ABOUTME: Command-line front end: eval/build/flake subcommands and the REPL (spec §6)

use clap::{Parser, Subcommand};
use nix_core::builtins::global_env;
use nix_core::config::{self, HELP_TEXT, WELCOME_MESSAGE, WELCOME_SUBTITLE};
use nix_core::error::EvalError;
use nix_core::eval::Evaluator;
use nix_core::flake::{self, TarballFetcher};
use nix_core::io::{FsIoHandle, IoHandle};
use nix_core::lexer::Lexer;
use nix_core::parser::parse;
use nix_core::value::Value;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

#[derive(Parser, Debug)]
#[command(name = "nix-core")]
#[command(version = config::VERSION)]
#[command(about = "A lazy, pure, functional expression-language interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a file (or stdin if omitted) and print the resulting value.
    Eval {
        file: Option<PathBuf>,
        /// Print the token stream instead of evaluating.
        #[arg(long)]
        lex: bool,
        /// Print the parsed syntax tree instead of evaluating.
        #[arg(long)]
        parse: bool,
        /// Alias for --parse.
        #[arg(long)]
        ast: bool,
    },
    /// Build an installable (`<flakeref>[#<attr-path>]`) and print its store path.
    Build { installable: String },
    /// Flake introspection.
    Flake {
        #[command(subcommand)]
        command: FlakeCommand,
    },
    /// Start an interactive read-eval-print loop.
    Repl,
}

#[derive(Subcommand, Debug)]
enum FlakeCommand {
    Show { path: Option<PathBuf> },
    Metadata { path: Option<PathBuf> },
    Lock { path: Option<PathBuf> },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Some(Command::Eval { file, lex, parse: parse_flag, ast }) => cmd_eval(file, lex, parse_flag || ast),
        Some(Command::Build { installable }) => cmd_build(&installable),
        Some(Command::Flake { command }) => cmd_flake(command),
        Some(Command::Repl) | None => {
            run_repl();
            Ok(())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_source(file: &Option<PathBuf>) -> Result<(String, String, PathBuf), String> {
    match file {
        Some(path) => {
            let src = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            Ok((src, path.to_string_lossy().into_owned(), base_dir))
        }
        None => {
            use std::io::Read;
            let mut src = String::new();
            std::io::stdin().read_to_string(&mut src).map_err(|e| format!("cannot read stdin: {e}"))?;
            Ok((src, "<stdin>".to_string(), std::env::current_dir().unwrap_or_default()))
        }
    }
}

fn cmd_eval(file: Option<PathBuf>, lex: bool, show_ast: bool) -> Result<(), String> {
    let (src, name, base_dir) = read_source(&file)?;

    if lex {
        let mut lexer = Lexer::new(&src);
        loop {
            match lexer.next_token() {
                Ok(tok) => {
                    let is_eof = tok.kind == nix_core::lexer::TokenKind::Eof;
                    println!("{:?}", tok.kind);
                    if is_eof {
                        break;
                    }
                }
                Err(e) => return Err(e.to_string()),
            }
        }
        return Ok(());
    }

    let expr = parse(&src, name, base_dir).map_err(|e| e.to_string())?;
    if show_ast {
        println!("{expr:#?}");
        return Ok(());
    }

    let io: Rc<dyn IoHandle> = Rc::new(FsIoHandle::new().map_err(|e| e.to_string())?);
    let mut ev = Evaluator::new(global_env(), io);
    let global = ev.global.clone();
    let value = ev.eval(&expr, &global).and_then(|v| ev.force(v)).map_err(|e| e.to_string())?;
    println!("{}", display_value(&mut ev, &value));
    Ok(())
}

fn cmd_build(installable: &str) -> Result<(), String> {
    let (flakeref, attr_path) = installable.split_once('#').unwrap_or((installable, ""));
    let root = if flakeref == "." { std::env::current_dir().unwrap_or_default() } else { PathBuf::from(flakeref) };

    let io: Rc<dyn IoHandle> = Rc::new(FsIoHandle::new().map_err(|e| e.to_string())?);
    let mut ev = Evaluator::new(global_env(), io);
    let fetcher = TarballFetcher;
    let outputs = flake::load_flake(&root, &mut ev, &fetcher, None, &Default::default()).map_err(|e| e.to_string())?;

    let system = config::current_system();
    let default_path = format!("packages.{system}.default");
    let path = if attr_path.is_empty() { default_path.as_str() } else { attr_path };

    let mut current = ev.force(outputs).map_err(|e| e.to_string())?;
    for segment in path.split('.') {
        let set = current.as_attrset().ok_or_else(|| format!("'{path}' does not name an attribute set"))?;
        let next = set.get(segment).cloned().ok_or_else(|| format!("no attribute '{segment}' in '{path}'"))?;
        current = ev.force(next).map_err(|e| e.to_string())?;
    }

    let set = current.as_attrset().ok_or_else(|| format!("'{path}' is not a derivation"))?;
    let out_path = set.get("outPath").and_then(|v| v.as_str()).ok_or_else(|| format!("'{path}' has no outPath"))?;
    println!("{out_path}");
    Ok(())
}

fn cmd_flake(command: FlakeCommand) -> Result<(), String> {
    match command {
        FlakeCommand::Show { path } => flake_show(path),
        FlakeCommand::Metadata { path } => flake_metadata(path),
        FlakeCommand::Lock { path } => flake_lock(path),
    }
}

fn flake_root(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

fn flake_show(path: Option<PathBuf>) -> Result<(), String> {
    let root = flake_root(path);
    let io: Rc<dyn IoHandle> = Rc::new(FsIoHandle::new().map_err(|e| e.to_string())?);
    let mut ev = Evaluator::new(global_env(), io);
    let fetcher = TarballFetcher;
    let outputs = flake::load_flake(&root, &mut ev, &fetcher, None, &Default::default()).map_err(|e| e.to_string())?;
    match ev.force(outputs) {
        Ok(value) => {
            print_tree(&mut ev, &value, 0);
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Per spec §7, a per-attribute failure while walking the outputs tree is
/// logged and that subtree is printed empty rather than aborting the whole
/// `flake show`.
fn print_tree(ev: &mut Evaluator, value: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        Value::AttrSet(set) => {
            for (name, v) in set.iter() {
                match ev.force(v.clone()) {
                    Ok(forced) => {
                        println!("{indent}{name}");
                        print_tree(ev, &forced, depth + 1);
                    }
                    Err(e) => {
                        log::warn!("flake show: failed to evaluate '{name}': {e}");
                        println!("{indent}{name} (evaluation failed)");
                    }
                }
            }
        }
        other => println!("{indent}= {}", display_value(ev, other)),
    }
}

fn flake_metadata(path: Option<PathBuf>) -> Result<(), String> {
    let root = flake_root(path);
    let io: Rc<dyn IoHandle> = Rc::new(FsIoHandle::new().map_err(|e| e.to_string())?);
    let mut ev = Evaluator::new(global_env(), io);
    let fetcher = TarballFetcher;
    let inputs = flake::lock_root_inputs(&root, &mut ev, &fetcher).map_err(|e| e.to_string())?;
    println!("path: {}", root.display());
    for (name, (flake_ref, rev)) in inputs {
        println!("input '{name}': {flake_ref:?} rev={}", rev.as_deref().unwrap_or("(none)"));
    }
    Ok(())
}

fn flake_lock(path: Option<PathBuf>) -> Result<(), String> {
    let root = flake_root(path);
    let io: Rc<dyn IoHandle> = Rc::new(FsIoHandle::new().map_err(|e| e.to_string())?);
    let mut ev = Evaluator::new(global_env(), io);
    let fetcher = TarballFetcher;
    let inputs = flake::lock_root_inputs(&root, &mut ev, &fetcher).map_err(|e| e.to_string())?;
    let lock = flake::render_lock_file(&inputs);
    println!("{}", serde_json::to_string_pretty(&lock).map_err(|e| e.to_string())?);
    Ok(())
}

/// Renders a value Nix-REPL style: quoted strings, bracketed lists, braced
/// sets (one level of attribute names; nested values are summarised rather
/// than fully unfolded, matching the same force-on-demand spirit as `nix
/// repl`'s own shallow printer).
fn display_value(ev: &mut Evaluator, v: &Value) -> String {
    match v {
        Value::Int(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Str(s) => format!("{s:?}"),
        Value::Path(p) => p.to_string(),
        Value::Lambda(_) | Value::Builtin(_) => "<lambda>".to_string(),
        Value::Thunk(_) => "<thunk>".to_string(),
        Value::List(items) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| match ev.force(item.clone()) {
                    Ok(forced) => display_value(ev, &forced),
                    Err(_) => "<error>".to_string(),
                })
                .collect();
            format!("[ {} ]", rendered.join(" "))
        }
        Value::AttrSet(set) => {
            let rendered: Vec<String> = set
                .iter()
                .map(|(k, val)| match ev.force(val.clone()) {
                    Ok(forced) => format!("{k} = {};", display_value(ev, &forced)),
                    Err(_) => format!("{k} = <error>;"),
                })
                .collect();
            format!("{{ {} }}", rendered.join(" "))
        }
    }
}

fn run_repl() {
    println!("{WELCOME_MESSAGE}");
    println!("{WELCOME_SUBTITLE}\n");

    let io: Rc<dyn IoHandle> = match FsIoHandle::new() {
        Ok(io) => Rc::new(io),
        Err(e) => {
            eprintln!("error: cannot open sandbox root: {e}");
            return;
        }
    };
    let mut ev = Evaluator::new(global_env(), io);

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("error: cannot start line editor: {e}");
            return;
        }
    };

    loop {
        match editor.readline("nix-core> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if !handle_repl_line(&mut ev, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("error: {e}");
                break;
            }
        }
    }
}

/// Handles one REPL line; returns `false` to end the session.
fn handle_repl_line(ev: &mut Evaluator, line: &str) -> bool {
    match line {
        ":quit" | ":q" => return false,
        ":help" => {
            println!("{HELP_TEXT}");
            return true;
        }
        _ => {}
    }
    if let Some(expr_src) = line.strip_prefix(":lex ") {
        let mut lexer = Lexer::new(expr_src);
        loop {
            match lexer.next_token() {
                Ok(tok) => {
                    let is_eof = tok.kind == nix_core::lexer::TokenKind::Eof;
                    println!("{:?}", tok.kind);
                    if is_eof {
                        break;
                    }
                }
                Err(e) => {
                    println!("lex error: {e}");
                    break;
                }
            }
        }
        return true;
    }
    if let Some(expr_src) = line.strip_prefix(":parse ") {
        match parse(expr_src, "<repl>", std::env::current_dir().unwrap_or_default()) {
            Ok(expr) => println!("{expr:#?}"),
            Err(e) => println!("parse error: {e}"),
        }
        return true;
    }

    match eval_line(ev, line) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => println!("error: {e}"),
    }
    true
}

fn eval_line(ev: &mut Evaluator, line: &str) -> Result<String, EvalError> {
    let expr = parse(line, "<repl>", std::env::current_dir().unwrap_or_default())?;
    let global = ev.global.clone();
    let value = ev.eval(&expr, &global)?;
    let forced = ev.force(value)?;
    Ok(display_value(ev, &forced))
}
