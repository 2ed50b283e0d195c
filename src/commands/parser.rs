//! Inbound text to typed [`Command`].
//!
//! Dispatch is a static table: each entry lists a command's names and
//! aliases, its usage line and the function that parses its arguments.

use crate::error::ValidationError;
use crate::state::WalletAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddWallet(WalletAddress),
    /// Full address or case-insensitive prefix
    RemoveWallet(String),
    AddCoin(String),
    RemoveCoin(String),
    SetConsensus(i64),
    SetInterval(i64),
    Reload,
    Last,
    Stats,
    Status,
    Config,
    Help,
    Examples,
    /// Starts with `/` but matches no table entry
    Unknown(String),
}

type ArgParser = fn(&[&str], &'static str) -> Result<Command, ValidationError>;

pub struct CommandSpec {
    pub names: &'static [&'static str],
    pub usage: &'static str,
    parse: ArgParser,
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        names: &["add_wallet"],
        usage: "/add_wallet 0x...",
        parse: parse_add_wallet,
    },
    CommandSpec {
        names: &["remove_wallet"],
        usage: "/remove_wallet 0x...",
        parse: parse_remove_wallet,
    },
    CommandSpec {
        names: &["add_coin"],
        usage: "/add_coin BTC",
        parse: parse_add_coin,
    },
    CommandSpec {
        names: &["remove_coin"],
        usage: "/remove_coin BTC",
        parse: parse_remove_coin,
    },
    CommandSpec {
        names: &["set_consensus"],
        usage: "/set_consensus 3",
        parse: parse_set_consensus,
    },
    CommandSpec {
        names: &["set_interval"],
        usage: "/set_interval 60",
        parse: parse_set_interval,
    },
    CommandSpec {
        names: &["reload", "refresh", "update"],
        usage: "/reload",
        parse: |_, _| Ok(Command::Reload),
    },
    CommandSpec {
        names: &["last", "latest"],
        usage: "/last",
        parse: |_, _| Ok(Command::Last),
    },
    CommandSpec {
        names: &["stats"],
        usage: "/stats",
        parse: |_, _| Ok(Command::Stats),
    },
    CommandSpec {
        names: &["status"],
        usage: "/status",
        parse: |_, _| Ok(Command::Status),
    },
    CommandSpec {
        names: &["config"],
        usage: "/config",
        parse: |_, _| Ok(Command::Config),
    },
    CommandSpec {
        names: &["help", "start"],
        usage: "/help",
        parse: |_, _| Ok(Command::Help),
    },
    CommandSpec {
        names: &["commands", "examples"],
        usage: "/commands",
        parse: |_, _| Ok(Command::Examples),
    },
];

/// Parse one inbound message. `None` when the text is not a command.
pub fn parse(text: &str) -> Option<Result<Command, ValidationError>> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    Some(match find(&name) {
        Some(spec) => (spec.parse)(&args, spec.usage),
        None => Ok(Command::Unknown(name)),
    })
}

/// Table entry for a command name or alias.
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.names.contains(&name))
}

/// Usage line of the table entry that produces `command`.
pub fn usage(command: &Command) -> &'static str {
    let name = match command {
        Command::AddWallet(_) => "add_wallet",
        Command::RemoveWallet(_) => "remove_wallet",
        Command::AddCoin(_) => "add_coin",
        Command::RemoveCoin(_) => "remove_coin",
        Command::SetConsensus(_) => "set_consensus",
        Command::SetInterval(_) => "set_interval",
        Command::Reload => "reload",
        Command::Last => "last",
        Command::Stats => "stats",
        Command::Status => "status",
        Command::Config => "config",
        Command::Help | Command::Unknown(_) => "help",
        Command::Examples => "commands",
    };
    find(name).map(|spec| spec.usage).unwrap_or("/help")
}

fn first_arg<'a>(args: &[&'a str], usage: &'static str) -> Result<&'a str, ValidationError> {
    args.first()
        .copied()
        .ok_or(ValidationError::MissingArgument { usage })
}

fn parse_number(args: &[&str], usage: &'static str) -> Result<i64, ValidationError> {
    let raw = first_arg(args, usage)?;
    raw.parse::<i64>()
        .map_err(|_| ValidationError::NotANumber(raw.to_string()))
}

fn parse_add_wallet(args: &[&str], usage: &'static str) -> Result<Command, ValidationError> {
    first_arg(args, usage)?.parse().map(Command::AddWallet)
}

fn parse_remove_wallet(args: &[&str], usage: &'static str) -> Result<Command, ValidationError> {
    Ok(Command::RemoveWallet(first_arg(args, usage)?.to_string()))
}

fn parse_add_coin(args: &[&str], usage: &'static str) -> Result<Command, ValidationError> {
    Ok(Command::AddCoin(first_arg(args, usage)?.to_string()))
}

fn parse_remove_coin(args: &[&str], usage: &'static str) -> Result<Command, ValidationError> {
    Ok(Command::RemoveCoin(first_arg(args, usage)?.to_string()))
}

fn parse_set_consensus(args: &[&str], usage: &'static str) -> Result<Command, ValidationError> {
    parse_number(args, usage).map(Command::SetConsensus)
}

fn parse_set_interval(args: &[&str], usage: &'static str) -> Result<Command, ValidationError> {
    parse_number(args, usage).map(Command::SetInterval)
}
