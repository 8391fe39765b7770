mod cli;
mod exit_codes;
mod init;
mod logger;
mod output;
mod run;
mod run_error;
mod workload_yaml;

use clap::Parser;
use mimalloc::MiMalloc;

use exit_codes::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success.as_i32(),
                _ => ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    let code = match cli.command {
        cli::Command::Run(args) => {
            logger::init_logging(args.verbose);
            match run::run(args).await {
                Ok(code) => code.as_i32(),
                Err(err) => {
                    eprintln!("{err}");
                    err.exit_code().as_i32()
                }
            }
        }
        cli::Command::Validate(args) => {
            let workload = args.workload.clone();
            match run::validate(args).await {
                Ok(cfg) => {
                    print!("{}", output::render_workload(&workload, &cfg));
                    println!("ok");
                    ExitCode::Success.as_i32()
                }
                Err(err) => {
                    eprintln!("{err}");
                    err.exit_code().as_i32()
                }
            }
        }
        cli::Command::Init(args) => match init::init(args).await {
            Ok(path) => {
                println!("wrote {}", path.display());
                ExitCode::Success.as_i32()
            }
            Err(err) => {
                eprintln!("{err:#}");
                ExitCode::RuntimeError.as_i32()
            }
        },
    };

    std::process::exit(code);
}
