//! Command Processor
//!
//! Maps a decoded request onto the cache and produces the reply. Argument
//! counts are validated while parsing, before anything touches the cache,
//! so a malformed request never has partial side effects.

use bytes::Bytes;

use crate::cache::Cache;
use crate::error::CommandError;
use crate::protocol::Frame;

/// Every command the server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping(Option<Bytes>),
    Echo(Bytes),
    Get(Bytes),
    Set(Bytes, Bytes),
    Del(Vec<Bytes>),
    Quit,
    Shutdown,
    /// Anything else, carrying the name as the client sent it
    Unknown(String),
}

/// What the connection should do after writing the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    /// Close this connection
    Close,
    /// Stop the whole server
    Shutdown,
}

impl Command {
    /// Builds a command from a request's arguments, the first being the
    /// case-insensitive command name.
    pub fn parse(args: Vec<Bytes>) -> Result<Self, CommandError> {
        let mut args = args.into_iter();
        let Some(name) = args.next() else {
            return Ok(Command::Unknown(String::new()));
        };
        let rest: Vec<Bytes> = args.collect();

        let command = match name.to_ascii_uppercase().as_slice() {
            b"PING" if rest.is_empty() => Command::Ping(None),
            b"PING" => {
                let [message] = exact::<1>(rest)?;
                Command::Ping(Some(message))
            }
            b"ECHO" => {
                let [message] = exact::<1>(rest)?;
                Command::Echo(message)
            }
            b"GET" => {
                let [key] = exact::<1>(rest)?;
                Command::Get(key)
            }
            b"SET" => {
                let [key, value] = exact::<2>(rest)?;
                Command::Set(key, value)
            }
            b"DEL" => {
                if rest.is_empty() {
                    return Err(CommandError::WrongArity);
                }
                Command::Del(rest)
            }
            b"QUIT" => Command::Quit,
            b"SHUTDOWN" => Command::Shutdown,
            _ => Command::Unknown(String::from_utf8_lossy(&name).into_owned()),
        };
        Ok(command)
    }

    /// Runs the command against `cache`.
    pub fn execute(self, cache: &Cache) -> (Frame, Action) {
        match self {
            Command::Ping(None) => (Frame::Simple("PONG".to_string()), Action::Continue),
            Command::Ping(Some(message)) | Command::Echo(message) => {
                (Frame::Bulk(message), Action::Continue)
            }
            Command::Get(key) => match cache.get(&key) {
                Some(value) => (Frame::Bulk(value), Action::Continue),
                None => (Frame::Null, Action::Continue),
            },
            Command::Set(key, value) => {
                // Acknowledged whether or not the cache keeps it.
                cache.set(key, value);
                (Frame::ok(), Action::Continue)
            }
            Command::Del(keys) => {
                let removed: usize = keys.iter().map(|key| cache.delete(key)).sum();
                (Frame::Integer(removed as i64), Action::Continue)
            }
            Command::Quit => (Frame::ok(), Action::Close),
            Command::Shutdown => (Frame::ok(), Action::Shutdown),
            Command::Unknown(name) => (
                Frame::error(CommandError::UnknownCommand(name)),
                Action::Continue,
            ),
        }
    }
}

fn exact<const N: usize>(args: Vec<Bytes>) -> Result<[Bytes; N], CommandError> {
    <[Bytes; N]>::try_from(args).map_err(|_| CommandError::WrongArity)
}

/// Parses and executes one request. Usage errors become error replies and
/// keep the connection open.
pub fn dispatch(args: Vec<Bytes>, cache: &Cache) -> (Frame, Action) {
    match Command::parse(args) {
        Ok(command) => command.execute(cache),
        Err(err) => (Frame::error(err), Action::Continue),
    }
}
