use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod bootstrap;
mod commands;
mod logging;

use bootstrap::Portal;

#[derive(Parser)]
#[command(name = "campus")]
#[command(about = "Campus portal client - session, chat, notifications and catalog", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/campus/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and its profile
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: String,
        /// student or teacher
        #[arg(long, default_value = "student")]
        role: String,
    },
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    SignOut,
    /// Show the signed-in identity and profile
    Whoami,
    /// Course, message, reservation and unread-notification counts
    Dashboard,
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
    Notifications {
        #[command(subcommand)]
        action: NotificationAction,
    },
    /// List library books
    Library {
        /// Case-insensitive title/author filter
        #[arg(long)]
        search: Option<String>,
    },
    Reservations {
        #[command(subcommand)]
        action: ReservationAction,
    },
    /// Weekly class schedule
    Schedule,
    /// Campus locations
    Map {
        /// building, library, cafeteria, parking, restroom or other
        #[arg(long)]
        kind: Option<String>,
    },
    /// Walk through the main flows against an in-memory backend
    Demo,
}

#[derive(Subcommand)]
enum ChatAction {
    /// List chat rooms
    Rooms,
    CreateRoom {
        name: String,
    },
    /// Post a message to a room
    Send {
        #[arg(long)]
        room: String,
        message: String,
    },
    /// Print a room's messages and follow new ones until Ctrl-C
    Tail {
        room: String,
    },
}

#[derive(Subcommand)]
enum NotificationAction {
    List {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
    },
    /// Mark a notification as read
    Read {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Print notifications as they arrive until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum ReservationAction {
    List,
    Create {
        #[arg(long)]
        classroom: String,
        #[arg(long)]
        title: String,
        /// RFC 3339 start, e.g. 2024-05-01T09:00:00Z
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = bootstrap::load_config(cli.config.as_deref())?;
    logging::init(&config.log.level);

    if let Commands::Demo = cli.command {
        return commands::demo::run().await;
    }

    let portal = Portal::connect(&config).await?;

    match cli.command {
        Commands::SignUp {
            email,
            password,
            full_name,
            role,
        } => commands::auth::sign_up(&portal, &email, &password, &full_name, &role).await?,
        Commands::SignIn { email, password } => {
            commands::auth::sign_in(&portal, &email, &password).await?
        }
        Commands::SignOut => commands::auth::sign_out(&portal).await?,
        Commands::Whoami => commands::auth::whoami(&portal)?,
        Commands::Dashboard => commands::dashboard::show(&portal).await?,
        Commands::Chat { action } => match action {
            ChatAction::Rooms => commands::chat::rooms(&portal).await?,
            ChatAction::CreateRoom { name } => commands::chat::create_room(&portal, &name).await?,
            ChatAction::Send { room, message } => {
                commands::chat::send(&portal, &room, &message).await?
            }
            ChatAction::Tail { room } => commands::chat::tail(&portal, &room).await?,
        },
        Commands::Notifications { action } => match action {
            NotificationAction::List { unread } => {
                commands::notifications::list(&portal, unread).await?
            }
            NotificationAction::Read { id } => commands::notifications::read(&portal, &id).await?,
            NotificationAction::Delete { id } => {
                commands::notifications::delete(&portal, &id).await?
            }
            NotificationAction::Watch => commands::notifications::watch(&portal).await?,
        },
        Commands::Library { search } => commands::catalog::library(&portal, search.as_deref()).await?,
        Commands::Reservations { action } => match action {
            ReservationAction::List => commands::catalog::reservations(&portal).await?,
            ReservationAction::Create {
                classroom,
                title,
                start,
                end,
                description,
            } => {
                commands::catalog::reserve(&portal, &classroom, &title, &start, &end, description)
                    .await?
            }
        },
        Commands::Schedule => commands::catalog::schedule(&portal).await?,
        Commands::Map { kind } => commands::catalog::map(&portal, kind.as_deref()).await?,
        Commands::Demo => {}
    }

    Ok(())
}
