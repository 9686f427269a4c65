use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "technotes")]
#[command(version, about = "Notes and users REST API for a repair shop")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Storage backend (loro or sqlite); overrides config.yaml
    #[arg(long, global = true, env = "TECHNOTES_BACKEND")]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new technotes project in the current directory
    Init,

    /// Run the HTTP API
    Serve {
        /// Port to listen on; overrides config.yaml
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },

    /// Manage users
    User(UserCommand),

    /// Inspect notes
    Note(NoteCommand),
}

#[derive(Args, Debug)]
pub struct UserCommand {
    #[command(subcommand)]
    pub action: UserAction,
}

#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Create a user
    Add {
        username: String,

        #[arg(long)]
        password: String,

        /// Role to grant (can be specified multiple times, default Employee)
        #[arg(long = "role", short = 'r')]
        roles: Vec<String>,
    },

    /// List users
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct NoteCommand {
    #[command(subcommand)]
    pub action: NoteAction,
}

#[derive(Subcommand, Debug)]
pub enum NoteAction {
    /// List notes with their owners
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
