use clap::Parser;
use form_autofill::cli::commands::{
    cmd_fill, cmd_forms_list, cmd_ingest, cmd_key_set, cmd_learn, cmd_profile_init,
    cmd_profile_set, cmd_profile_show, open_store,
};
use form_autofill::cli::config::{
    Cli, Commands, FormsAction, KeyAction, ProfileAction, load_config, resolve_settings,
};
use form_autofill::report::console::format_failure;
use form_autofill::round::error::AutofillError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprint!("{}", format_failure(&e));
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("form_autofill={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), AutofillError> {
    // Resolve settings: CLI > config > defaults
    let config = load_config(cli.config.as_deref());
    let settings = resolve_settings(&cli, &config);

    match cli.command {
        Commands::Fill { html, output } => cmd_fill(&settings, &html, &output).await,
        Commands::Learn { html, url } => cmd_learn(&settings, &html, url.as_deref()).await,
        Commands::Ingest { file, pdf } => cmd_ingest(&settings, &file, pdf).await,
        Commands::Profile { action } => {
            let store = open_store(&settings);
            match action {
                ProfileAction::Show => cmd_profile_show(store.as_ref()),
                ProfileAction::Init { force } => cmd_profile_init(store.as_ref(), force).map(|_| ()),
                ProfileAction::Set { file } => cmd_profile_set(store.as_ref(), &file),
            }
        }
        Commands::Key { action } => {
            let store = open_store(&settings);
            match action {
                KeyAction::Set { key, validate } => {
                    cmd_key_set(&settings, store.as_ref(), &key, validate).await
                }
            }
        }
        Commands::Forms { action } => {
            let store = open_store(&settings);
            match action {
                FormsAction::List => cmd_forms_list(store.as_ref()),
            }
        }
    }
}
