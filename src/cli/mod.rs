//! CLI module for feedsync
//!
//! Every command runs against a fresh client: it optionally signs in,
//! executes one read or write through the query layer and prints the
//! result as JSON on stdout.

mod run;

pub use run::run;

use clap::{Parser, Subcommand};

/// Feedsync - query the social feed backend from the command line
#[derive(Parser, Debug)]
#[command(name = "feedsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Account email to sign in with before running the command
    #[arg(long, global = true, requires = "password")]
    pub email: Option<String>,

    /// Account password
    #[arg(long, global = true, requires = "email")]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Newest posts
    Recent,

    /// The infinite feed, loading up to the given number of pages
    Feed {
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// A single post
    Post { id: String },

    /// Posts whose caption matches a term
    Search { term: String },

    /// Like a post, or remove the like with --remove
    Like {
        post: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        remove: bool,
    },

    /// Save a post for a user
    Save {
        post: String,
        #[arg(long)]
        user: String,
    },

    /// Profile of the signed-in account
    Whoami,
}
