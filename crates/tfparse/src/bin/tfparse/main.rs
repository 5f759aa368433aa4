mod cli;

use tfparse::Options;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("TFPARSE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn run(cli: cli::Cli) -> anyhow::Result<()> {
    let mut options = Options::default()
        .with_debug(cli.debug)
        .with_stop_on_hcl_error(cli.stop_on_hcl_error)
        .with_allow_downloads(cli.allow_downloads)
        .with_workspace_name(cli.workspace);

    for vars_file in cli.vars_files {
        options = options.with_vars_path(vars_file);
    }

    // keep logging to the subscriber installed above
    let sink = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    let json = tfparse::load_from_path_with_sink(&cli.path, &options, &sink)?;

    output(&cli.format, &json)
}

fn output(format: &cli::OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), value)?;
            println!();
        }
    };

    Ok(())
}
