mod commands;
mod handlers;

pub use commands::{Cli, Commands, NoteAction, NoteCommand, UserAction, UserCommand};
pub use handlers::{
    handle_init, handle_note_list, handle_serve, handle_user_add, handle_user_list,
};
