//! Command-line front door for the toolchain.
//!
//! Three commands share one option parser: `run` executes a program through
//! the evaluator, `build` compiles it to a raw code buffer (optionally
//! dumping the relocation report as JSON), and `ast` prints the typed tree.
//! Front-end errors are rendered with the offending source line and a caret.

use std::env;
use std::fs;
use std::io;
use std::process::ExitCode;

use ncc::ast::dump_program;
use ncc::interp::Interp;
use ncc::{compile_source, parse_source, BuildError};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let Some(cmd) = args.first() else {
        return Err(usage());
    };
    match cmd.as_str() {
        "run" => cmd_run(&args[1..]),
        "build" => cmd_build(&args[1..]),
        "ast" => cmd_ast(&args[1..]),
        "help" | "--help" | "-h" => {
            print!("{}", usage());
            Ok(())
        }
        other => Err(format!("unknown command '{}'\n{}", other, usage())),
    }
}

fn usage() -> String {
    let lines = [
        "usage: ncc <command> [options]",
        "",
        "commands:",
        "  run    --in <file>                 parse and execute a program",
        "  build  --in <file> --out <file>    compile to a raw code buffer",
        "         [--relocs <file>]           also dump the relocation report as JSON",
        "  ast    --in <file>                 print the typed syntax tree",
        "",
    ];
    lines.join("\n")
}

// ------------------------------
// Commands
// ------------------------------

fn cmd_run(args: &[String]) -> Result<(), String> {
    let opts = parse_opts(args)?;
    let path = opts.input.ok_or("run: --in is required")?;
    let source = load_source(&path)?;
    let parsed = parse_source(&source).map_err(|e| e.render(&source))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut interp = Interp::new(stdin.lock(), stdout.lock());
    interp.run(&parsed.stmts).map_err(|e| e.to_string())
}

fn cmd_build(args: &[String]) -> Result<(), String> {
    let opts = parse_opts(args)?;
    let input = opts.input.ok_or("build: --in is required")?;
    let output = opts.output.ok_or("build: --out is required")?;
    let source = load_source(&input)?;

    let artifact = compile_source(&source).map_err(|e| match e {
        BuildError::Compile(c) => c.render(&source),
        BuildError::Codegen(c) => c.to_string(),
    })?;

    for w in &artifact.warnings {
        eprintln!("warning: {}", w);
    }

    fs::write(&output, &artifact.code)
        .map_err(|e| format!("cannot write '{}': {}", output, e))?;

    if let Some(relocs) = opts.relocs {
        let report = artifact.relocation_report();
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("cannot serialize relocation report: {}", e))?;
        fs::write(&relocs, json)
            .map_err(|e| format!("cannot write '{}': {}", relocs, e))?;
    }
    Ok(())
}

fn cmd_ast(args: &[String]) -> Result<(), String> {
    let opts = parse_opts(args)?;
    let path = opts.input.ok_or("ast: --in is required")?;
    let source = load_source(&path)?;
    let parsed = parse_source(&source).map_err(|e| e.render(&source))?;
    print!("{}", dump_program(&parsed.stmts));
    Ok(())
}

// ------------------------------
// Options
// ------------------------------

#[derive(Debug, Default, PartialEq, Eq)]
struct Opts {
    input: Option<String>,
    output: Option<String>,
    relocs: Option<String>,
}

fn parse_opts(args: &[String]) -> Result<Opts, String> {
    let mut opts = Opts::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--in" => opts.input = Some(req_arg(args, &mut i, "--in")?.to_string()),
            "--out" => opts.output = Some(req_arg(args, &mut i, "--out")?.to_string()),
            "--relocs" => opts.relocs = Some(req_arg(args, &mut i, "--relocs")?.to_string()),
            other => return Err(format!("unknown option '{}'", other)),
        }
        i += 1;
    }
    Ok(opts)
}

fn req_arg<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn load_source(path: &str) -> Result<String, String> {
    let source = fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path, e))?;
    if source.trim().is_empty() {
        return Err(format!("input file '{}' is empty", path));
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_all_flags() {
        let args = strs(&["--in", "a.n", "--out", "a.bin", "--relocs", "a.json"]);
        let opts = parse_opts(&args).expect("parse");
        assert_eq!(opts.input.as_deref(), Some("a.n"));
        assert_eq!(opts.output.as_deref(), Some("a.bin"));
        assert_eq!(opts.relocs.as_deref(), Some("a.json"));
    }

    #[test]
    fn flag_without_value_is_rejected() {
        let err = parse_opts(&strs(&["--in"])).expect_err("must fail");
        assert!(err.contains("--in requires a value"));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = parse_opts(&strs(&["--frobnicate"])).expect_err("must fail");
        assert!(err.contains("--frobnicate"));
    }

    #[test]
    fn unknown_command_mentions_usage() {
        let err = run(&strs(&["disassemble"])).expect_err("must fail");
        assert!(err.contains("unknown command 'disassemble'"));
        assert!(err.contains("usage:"));
    }
}
