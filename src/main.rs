mod ast;
mod bytecode;
mod lexer;
mod parser;
mod parser_error;
mod token;

use std::{env, fs, path::Path};

use crate::bytecode::compile::Compiler;
use crate::bytecode::disasm::disassemble;
use crate::bytecode::unit::CompilationUnit;
use crate::lexer::Lexer;
use crate::parser::Parser;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let ast = args.contains(&"--ast".to_string());
    let disasm = args.contains(&"--disasm".to_string());

    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_usage();
        return;
    }

    // first non-flag argument is the filename
    let filename = args.iter().skip(1).find(|a| !a.starts_with('-'));

    match filename {
        Some(filename) => {
            ensure_extension(filename);
            match fs::read_to_string(filename) {
                Ok(source) => compile_file(&source, tokens_only, ast, disasm),
                Err(e) => {
                    eprintln!("Failed to read '{}': {}", filename, e);
                    std::process::exit(1);
                }
            }
        }
        None => print_usage(),
    }
}

fn ensure_extension(filename: &str) {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some("cn") {
        eprintln!("Error: expected a .cn file, got {}", filename);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("CINDER - Bytecode Compiler");
    println!();
    println!("Usage:");
    println!("  cinder <file.cn>           Compile and summarize the unit");
    println!("  cinder --tokens <file.cn>  Show tokens only");
    println!("  cinder --ast <file.cn>     Show the parsed program");
    println!("  cinder --disasm <file.cn>  Compile and print a disassembly");
    println!("  cinder --help, -h          Show this help");
}

fn compile_file(source: &str, tokens_only: bool, ast: bool, disasm: bool) {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            std::process::exit(1);
        }
    };

    if tokens_only {
        for spanned in &tokens {
            println!(
                "{}:{} {}",
                spanned.span.line, spanned.span.col, spanned.token
            );
        }
        return;
    }

    let program = match Parser::new(tokens).parse() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            std::process::exit(1);
        }
    };

    if ast {
        println!("{:#?}", program);
        return;
    }

    let unit = match Compiler::new().compile(&program) {
        Ok(unit) => unit,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            std::process::exit(1);
        }
    };

    if disasm {
        let mut stdout = std::io::stdout();
        if let Err(e) = disassemble(&unit, &mut stdout) {
            eprintln!("Disassembly error: {}", e);
            std::process::exit(1);
        }
    } else {
        print_summary(&unit);
    }
}

fn print_summary(unit: &CompilationUnit) {
    println!("{} byte(s) of code", unit.code.len());

    let mut names: Vec<_> = unit.functions.keys().collect();
    names.sort();
    for name in names {
        let function = unit.functions[name];
        println!(
            "  {} -> entry {:04x}, {} local(s)",
            name, function.entry_point, function.local_count
        );
    }
}
