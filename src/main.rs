use std::io::{Write, stdin, stdout};

use clap::Parser;
use clap::Subcommand;
use miette::IntoDiagnostic;
use miette::WrapErr;
use rpn_calc::Interpreter;
use rpn_calc::lex::{
    EmptyInputError, InvalidBracketContentError, MisplacedUnaryOperatorError,
    UnbalancedExpressionError, UnknownTokenError, UnmatchedBracketError,
};

#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Evaluate an expression such as `4 ( 5 9 * ) +`
    Eval {
        /// Read from stdin when omitted
        expression: Option<String>,
        /// Print every reduction before the result
        #[arg(long)]
        trace: bool,
    },
    /// Print the validated token sequence
    Tokenize { expression: Option<String> },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Eval { expression, trace } => {
            let expression = read_expression(expression)?;
            let result =
                Interpreter::new(Some("<expression>"), &expression).and_then(|mut interpreter| {
                    for step in interpreter.by_ref() {
                        let step = step?;
                        if trace {
                            println!("{step}");
                        }
                    }
                    interpreter.finish()
                });
            match result {
                Ok(n) => println!("{n}"),
                Err(e) => exit_on_syntax_error(e)?,
            }
        }
        Commands::Tokenize { expression } => {
            let expression = read_expression(expression)?;
            match rpn_calc::Lexer::new(Some("<expression>"), &expression).tokenize() {
                Ok(tokens) => {
                    for token in tokens {
                        println!("{token}");
                    }
                }
                Err(e) => exit_on_syntax_error(e)?,
            }
        }
    }
    Ok(())
}

fn read_expression(expression: Option<String>) -> miette::Result<String> {
    if let Some(expression) = expression {
        return Ok(expression);
    }
    print!("Enter an RPN expression: ");
    stdout().flush().into_diagnostic()?;
    let mut line = String::new();
    stdin()
        .read_line(&mut line)
        .into_diagnostic()
        .wrap_err("reading expression from stdin failed")?;
    Ok(line)
}

fn exit_on_syntax_error(e: miette::Error) -> miette::Result<()> {
    let syntax = e.downcast_ref::<EmptyInputError>().is_some()
        || e.downcast_ref::<UnknownTokenError>().is_some()
        || e.downcast_ref::<UnmatchedBracketError>().is_some()
        || e.downcast_ref::<InvalidBracketContentError>().is_some()
        || e.downcast_ref::<UnbalancedExpressionError>().is_some()
        || e.downcast_ref::<MisplacedUnaryOperatorError>().is_some();
    if syntax {
        eprintln!("{e:?}");
        std::process::exit(65);
    }
    Err(e)
}
