use clap::Parser;
use technotes::cli::{
    handle_init, handle_note_list, handle_serve, handle_user_add, handle_user_list, Cli, Commands,
    NoteAction, NoteCommand, UserAction, UserCommand,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let backend = cli.backend;

    let result = match cli.command {
        Commands::Init => handle_init(backend).await,
        Commands::Serve { port } => handle_serve(backend, port).await,
        Commands::User(UserCommand { action }) => match action {
            UserAction::Add {
                username,
                password,
                roles,
            } => handle_user_add(backend, username, password, roles).await,
            UserAction::List { json } => handle_user_list(backend, json).await,
        },
        Commands::Note(NoteCommand { action }) => match action {
            NoteAction::List { json } => handle_note_list(backend, json).await,
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
