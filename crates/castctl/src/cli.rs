//! Command-line surface: the subcommand registry.
//!
//! Each subcommand is a [`CommandSpec`]: a name, the arguments it declares,
//! and a constructor that turns parsed matches into an [`Orchestrator`].
//! URL-launch subcommands come from configuration, so the parser is built at
//! runtime with the clap builder API.
//!
//! ```text
//! castctl [--debug] [--config <PATH>] <COMMAND>
//!
//!   discover
//!   status    <host> [--port <PORT>]
//!   watch     <host> [app] [--port <PORT>]
//!   run       <host> <app> [--namespace <NS>] [--port <PORT>]
//!   hello     <host> <text>... [--port <PORT>]
//!   tictactoe <host> <app> [--port <PORT>]
//!   media     <host> <url> [--port <PORT>]      (one per URL launcher)
//! ```

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use castctl_core::DeviceEndpoint;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use crate::application::commands::{
    DiscoverCommand, HelloCommand, Orchestrator, RunCommand, StatusCommand, TicTacToeCommand,
    UrlLaunchCommand, UrlLauncher, WatchCommand,
};
use crate::infrastructure::config::AppConfig;

type ArgsFn = Box<dyn Fn(Command) -> Command>;
type BuildFn = Box<dyn Fn(&ArgMatches, &AppConfig) -> anyhow::Result<Box<dyn Orchestrator>>>;

/// One registered subcommand.
pub struct CommandSpec {
    name: String,
    about: String,
    args: ArgsFn,
    build: BuildFn,
}

impl CommandSpec {
    pub fn new<A, B>(name: impl Into<String>, about: impl Into<String>, args: A, build: B) -> Self
    where
        A: Fn(Command) -> Command + 'static,
        B: Fn(&ArgMatches, &AppConfig) -> anyhow::Result<Box<dyn Orchestrator>> + 'static,
    {
        Self {
            name: name.into(),
            about: about.into(),
            args: Box::new(args),
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn command(&self) -> Command {
        (self.args)(Command::new(self.name.clone()).about(self.about.clone()))
    }
}

/// Maps subcommand names to their argument shape and constructor.
#[derive(Default)]
pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
    shadowed: Vec<String>,
}

impl CommandRegistry {
    /// The built-in commands plus one subcommand per configured URL launcher.
    pub fn with_builtins(config: &AppConfig) -> Self {
        let mut registry = Self::default();
        registry.register(discover_spec());
        registry.register(status_spec());
        registry.register(watch_spec());
        registry.register(run_spec());
        registry.register(hello_spec());
        registry.register(tictactoe_spec());
        for launcher in config.launchers() {
            registry.register(url_launch_spec(launcher));
        }
        registry
    }

    /// Adds `spec`.  A spec whose name is already taken is set aside and
    /// reported by [`shadowed`](Self::shadowed).
    pub fn register(&mut self, spec: CommandSpec) {
        if self.specs.iter().any(|s| s.name == spec.name) {
            self.shadowed.push(spec.name);
        } else {
            self.specs.push(spec);
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name()).collect()
    }

    /// Names of specs dropped because an earlier spec already had the name.
    pub fn shadowed(&self) -> &[String] {
        &self.shadowed
    }

    /// The root parser.
    pub fn command(&self) -> Command {
        let root = Command::new("castctl")
            .about("Discover and remote-control network media receivers")
            .version(env!("CARGO_PKG_VERSION"))
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                Arg::new("debug")
                    .long("debug")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Log at debug level (RUST_LOG still wins)"),
            )
            .arg(
                Arg::new("config")
                    .long("config")
                    .global(true)
                    .value_name("PATH")
                    .value_parser(value_parser!(PathBuf))
                    .help("Configuration file [default: $CASTCTL_CONFIG or ~/.config/castctl/config.toml]"),
            );
        self.specs.iter().fold(root, |cmd, spec| cmd.subcommand(spec.command()))
    }

    /// Builds the orchestrator for the subcommand in `matches`.
    ///
    /// # Errors
    ///
    /// Fails if no registered subcommand was matched or its arguments are
    /// incomplete.
    pub fn build(&self, matches: &ArgMatches, config: &AppConfig) -> anyhow::Result<Box<dyn Orchestrator>> {
        let (name, sub) = matches.subcommand().ok_or_else(|| anyhow!("no subcommand given"))?;
        let spec = self
            .specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| anyhow!("unknown command {name}"))?;
        (spec.build)(sub, config).with_context(|| format!("invalid arguments for {name}"))
    }
}

/// Finds `--config <PATH>` (or `--config=PATH`) before the full parser exists.
///
/// The parser itself depends on the configuration, so the path has to be
/// located first.
pub fn config_path_from_args(args: &[OsString]) -> Option<PathBuf> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let arg = arg.to_string_lossy();
        if arg == "--" {
            break;
        }
        if arg == "--config" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

// ── Argument helpers ──────────────────────────────────────────────────────────

fn device_args(cmd: Command) -> Command {
    cmd.arg(Arg::new("host").required(true).help("Device hostname or IP address"))
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Device port [default: from config, 8009]"),
        )
}

fn endpoint(matches: &ArgMatches, config: &AppConfig) -> anyhow::Result<DeviceEndpoint> {
    let host = required(matches, "host")?;
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .unwrap_or(config.client.default_port);
    Ok(DeviceEndpoint::new(host, port))
}

fn required(matches: &ArgMatches, id: &str) -> anyhow::Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| anyhow!("missing <{id}>"))
}

fn app_arg(required: bool) -> Arg {
    Arg::new("app")
        .required(required)
        .help("Receiver application id")
}

// ── Built-in specs ────────────────────────────────────────────────────────────

fn discover_spec() -> CommandSpec {
    CommandSpec::new(
        "discover",
        "Log receivers appearing and disappearing on the network",
        |cmd| cmd,
        |_, config| Ok(Box::new(DiscoverCommand::new(config.scan_options()))),
    )
}

fn status_spec() -> CommandSpec {
    CommandSpec::new(
        "status",
        "Show a receiver's volume and running applications",
        device_args,
        |m, config| {
            Ok(Box::new(StatusCommand::new(
                endpoint(m, config)?,
                config.connect_options(),
            )))
        },
    )
}

fn watch_spec() -> CommandSpec {
    CommandSpec::new(
        "watch",
        "Log device messages, or an application's session messages, until interrupted",
        |cmd| device_args(cmd).arg(app_arg(false)),
        |m, config| {
            Ok(Box::new(WatchCommand::new(
                endpoint(m, config)?,
                config.connect_options(),
                m.get_one::<String>("app").cloned(),
            )))
        },
    )
}

fn run_spec() -> CommandSpec {
    CommandSpec::new(
        "run",
        "Launch an application, optionally opening a session on a namespace",
        |cmd| {
            device_args(cmd).arg(app_arg(true)).arg(
                Arg::new("namespace")
                    .long("namespace")
                    .short('n')
                    .value_name("NS")
                    .help("Start a session on this namespace"),
            )
        },
        |m, config| {
            Ok(Box::new(RunCommand::new(
                endpoint(m, config)?,
                config.connect_options(),
                required(m, "app")?,
                m.get_one::<String>("namespace").cloned(),
            )))
        },
    )
}

fn hello_spec() -> CommandSpec {
    CommandSpec::new(
        "hello",
        "Send a text message to the hello-world receiver app",
        |cmd| {
            device_args(cmd).arg(
                Arg::new("text")
                    .required(true)
                    .num_args(1..)
                    .trailing_var_arg(true)
                    .help("Message text; words are joined with spaces"),
            )
        },
        |m, config| {
            let words = m
                .get_many::<String>("text")
                .ok_or_else(|| anyhow!("missing <text>"))?;
            let command = HelloCommand::new(
                endpoint(m, config)?,
                config.connect_options(),
                config.hello.app_id.clone(),
                config.hello.namespace.clone(),
                words,
            )
            .with_hold(config.hello_hold());
            Ok(Box::new(command))
        },
    )
}

fn tictactoe_spec() -> CommandSpec {
    CommandSpec::new(
        "tictactoe",
        "Join a tic-tac-toe game running on the receiver and play it",
        |cmd| device_args(cmd).arg(app_arg(true)),
        |m, config| {
            Ok(Box::new(TicTacToeCommand::new(
                endpoint(m, config)?,
                config.connect_options(),
                required(m, "app")?,
                config.tictactoe.namespace.clone(),
                config.tictactoe.player_name.clone(),
            )))
        },
    )
}

fn url_launch_spec(launcher: UrlLauncher) -> CommandSpec {
    let name = launcher.name.clone();
    let about = launcher.description.clone();
    CommandSpec::new(
        name,
        about,
        |cmd| device_args(cmd).arg(Arg::new("url").required(true).help("URL to open")),
        move |m, config| {
            Ok(Box::new(UrlLaunchCommand::new(
                endpoint(m, config)?,
                config.connect_options(),
                launcher.clone(),
                required(m, "url")?,
            )))
        },
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
