//! Line-oriented front-end for the allocator. Parses user
//! commands, keeps the session's allocator and renders its block
//! list after each action.

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::core::allocator::{Address, AllocError, Allocator};

/// Number of cells in the usage bar.
const BAR_WIDTH: u64 = 20;

/// Position argument that asks for automatic placement.
const AUTO_POSITION: &str = "-1";

pub const HELP: &str = "\
Commands:
  init <total>               create a new address space of <total> units
  alloc <size> [<pos> | -1]  allocate <size> units at <pos>, or first-fit
  free <address>             release the block starting at <address>
  show                       print the block list
  help                       print this message
  quit                       leave the simulator";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Init(u64),
    Allocate {
        size: u64,
        position: Option<Address>,
    },
    Free(Address),
    Show,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a non-negative integer")]
    NotANumber(String),
}

fn number(arg: &str) -> Result<u64, ParseError> {
    arg.parse().map_err(|_| ParseError::NotANumber(arg.to_owned()))
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(ParseError::Empty)?.to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        // Raw input is checked here so that the allocator only
        // ever sees well-formed numbers.
        let command = match (verb.as_str(), args.as_slice()) {
            ("init", [total]) => Command::Init(number(total)?),
            ("init", _) => return Err(ParseError::Usage("init <total>")),
            ("alloc", [size]) => Command::Allocate {
                size: number(size)?,
                position: None,
            },
            ("alloc", [size, position]) => Command::Allocate {
                size: number(size)?,
                position: match *position {
                    AUTO_POSITION => None,
                    position => Some(number(position)?),
                },
            },
            ("alloc", _) => return Err(ParseError::Usage("alloc <size> [<pos> | -1]")),
            ("free", [address]) => Command::Free(number(address)?),
            ("free", _) => return Err(ParseError::Usage("free <address>")),
            ("show", []) => Command::Show,
            ("help", _) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            ("show" | "quit" | "exit", _) => return Err(ParseError::Usage("show | quit")),
            _ => return Err(ParseError::Unknown(verb)),
        };

        Ok(command)
    }
}

/// What a successfully executed command did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    Initialized(u64),
    Allocated { address: Address, size: u64 },
    Freed(Address),
    Snapshot,
    Help,
    Quit,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Initialized(total) => write!(f, "Initialized {total} units of memory."),
            Response::Allocated { address, size } => write!(f, "Allocated {size} units at {address}."),
            Response::Freed(address) => write!(f, "Freed the block at {address}."),
            Response::Snapshot => f.write_str("Block list requested."),
            Response::Help => f.write_str("Help requested."),
            Response::Quit => f.write_str("Quitting."),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("memory is not initialized, use 'init <total>' first")]
    NotInitialized,
    #[error("{}", describe(.0))]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

fn describe(error: &AllocError) -> String {
    match error {
        AllocError::NoSpace { .. } => {
            format!("allocation failed, consider freeing up space ({error})")
        }
        AllocError::InvalidAddress(_) => format!("deallocation failed ({error})"),
        AllocError::InvalidSize(_) => error.to_string(),
    }
}

/// State of one interactive run. Holds no allocator until the
/// user initializes memory.
#[derive(Debug, Default)]
pub struct Session {
    allocator: Option<Allocator>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session that is already initialized with
    /// `total_size` units.
    pub fn with_size(total_size: u64) -> Result<Self, SessionError> {
        Ok(Self {
            allocator: Some(Allocator::new(total_size)?),
        })
    }

    pub fn allocator(&self) -> Option<&Allocator> {
        self.allocator.as_ref()
    }

    fn initialized(&mut self) -> Result<&mut Allocator, SessionError> {
        self.allocator.as_mut().ok_or(SessionError::NotInitialized)
    }

    pub fn execute(&mut self, command: Command) -> Result<Response, SessionError> {
        let response = match command {
            Command::Init(total) => {
                // Initializing again drops the previous space and
                // everything allocated in it.
                self.allocator = Some(Allocator::new(total)?);
                Response::Initialized(total)
            }
            Command::Allocate { size, position } => {
                let address = self.initialized()?.allocate(size, position)?;
                Response::Allocated { address, size }
            }
            Command::Free(address) => {
                self.initialized()?.deallocate(address)?;
                Response::Freed(address)
            }
            Command::Show => {
                self.initialized()?;
                Response::Snapshot
            }
            Command::Help => Response::Help,
            Command::Quit => Response::Quit,
        };

        Ok(response)
    }

    /// Parses and executes one line of input.
    pub fn run_line(&mut self, line: &str) -> Result<Response, SessionError> {
        let command = line.parse::<Command>()?;
        self.execute(command)
    }
}

/// Renders the block list, one block per line, followed by a
/// usage bar.
pub fn render(allocator: &Allocator) -> String {
    let mut lines: Vec<String> = allocator
        .blocks()
        .iter()
        .map(ToString::to_string)
        .collect();

    let percent = allocator.utilization_percent();
    let filled = u64::from(percent) * BAR_WIDTH / 100;
    lines.push(format!(
        "Usage: [{}{}] {percent}% ({}/{})",
        "#".repeat(filled as usize),
        "-".repeat((BAR_WIDTH - filled) as usize),
        allocator.allocated_bytes(),
        allocator.total_size(),
    ));

    lines.join("\n")
}
