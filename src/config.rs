//! Configuration.
//!
//! This module primarily contains the type [`Config`] that holds all the
//! configuration used by the gateway. It can be loaded both from a TOML
//! formatted config file and command line options.

use std::{env, fmt, fs};
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use clap::{Command, Args, ArgAction, ArgMatches, FromArgMatches, Parser};
use dirs::home_dir;
use log::{LevelFilter, error};
#[cfg(unix)] use syslog::Facility;
use crate::error::Failed;
use crate::vhost::VhostMode;


//------------ Defaults for Some Values --------------------------------------

/// The name of the config file in the home directory.
const DEFAULT_CONFIG_FILE: &str = ".dathost.conf";

/// The default archive directory relative to the home directory.
const DEFAULT_ARCHIVE_DIR: &str = ".dathost/archives";

/// The name of the registry file in the archive directory.
const DEFAULT_REGISTRY_FILE: &str = "registry.toml";

/// The default address to listen on for HTTP.
const DEFAULT_HTTP_LISTEN: SocketAddr = SocketAddr::new(
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080
);

/// The default max-age for cached file responses in seconds.
const DEFAULT_CACHE_MAX_AGE: u64 = 60;

/// The default syslog facility.
#[cfg(unix)]
const DEFAULT_SYSLOG_FACILITY: Facility = Facility::LOG_DAEMON;


//------------ Config --------------------------------------------------------

/// Gateway configuration.
///
/// This type contains both the basic configuration, such as where to find
/// the archives, as well as the configuration for server mode.
///
/// All values are public and can be accessed directly.
///
/// The two functions [`config_args`][Self::config_args] and
/// [`server_args`][Self::server_args] can be used to create the clap
/// application. Its matches can then be used to create the basic config via
/// [`from_arg_matches`][Self::from_arg_matches]. The server configuration
/// can be added via
/// [`apply_server_arg_matches`][Self::apply_server_arg_matches] from the
/// subcommand matches. Finally, [`to_toml`][Self::to_toml] can be used to
/// produce a TOML value that contains a config file content representing
/// the current configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Path to the directory the archives are kept in.
    pub archive_dir: PathBuf,

    /// Path to the registry file.
    ///
    /// If this is `None`, the file is in the archive directory.
    pub registry: Option<PathBuf>,

    /// How virtual hosts are mapped to archives.
    pub vhost_mode: VhostMode,

    /// Addresses to listen on for HTTP.
    pub http_listen: Vec<SocketAddr>,

    /// The max-age for cached file responses in seconds.
    pub cache_max_age: u64,

    /// The log levels to be logged.
    pub log_level: LevelFilter,

    /// The target to log to.
    pub log_target: LogTarget,
}


impl Config {
    /// Adds the basic arguments to a clap app.
    ///
    /// The function follows clap’s builder pattern: it takes an app,
    /// adds a bunch of arguments to it and returns it at the end.
    pub fn config_args(app: Command) -> Command {
        GlobalArgs::augment_args(app)
    }

    /// Adds the relevant config args to the server subcommand.
    ///
    /// Some of the options in the config only make sense for the server.
    /// This function adds them to the subcommand provided via `app`.
    pub fn server_args(app: Command) -> Command {
        ServerArgs::augment_args(app)
    }

    /// Creates a configuration from command line matches.
    ///
    /// The function attempts to create configuration from the command line
    /// arguments provided via `matches`. It will try to read a config file
    /// if provided via the config file option (`-c` or `--config`) or a
    /// file in `$HOME/.dathost.conf` otherwise. If the latter doesn’t
    /// exist either, starts with a default configuration.
    ///
    /// All relative paths given in command line arguments will be interpreted
    /// relative to `cur_dir`. Conversely, paths in the config file are
    /// treated as relative to the config file’s directory.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        cur_dir: &Path,
    ) -> Result<Self, Failed> {
        let mut res = Self::create_base_config(
            Self::path_value_of(matches, "config", cur_dir)
                .as_ref().map(AsRef::as_ref)
        )?;

        res.apply_arg_matches(matches, cur_dir)?;

        Ok(res)
    }

    /// Applies the basic command line arguments to a configuration.
    ///
    /// The path arguments in `matches` will be interpreted relative to
    /// `cur_dir`.
    fn apply_arg_matches(
        &mut self,
        matches: &ArgMatches,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        let args = GlobalArgs::from_arg_matches(
            matches
        ).expect("bug in command line arguments parser");

        self.apply_log_matches(&args, cur_dir)?;

        // archive_dir
        if let Some(dir) = args.archive_dir {
            self.archive_dir = cur_dir.join(dir)
        }
        if self.archive_dir == Path::new("") {
            error!(
                "Couldn’t determine default archive directory: \
                 no home directory.\n\
                 Please specify the archive directory with the -d option."
            );
            return Err(Failed)
        }

        // registry
        if let Some(path) = args.registry {
            self.registry = Some(cur_dir.join(path))
        }

        // log_level
        if args.verbose > 1 {
            self.log_level = LevelFilter::Debug
        }
        else if args.verbose == 1 {
            self.log_level = LevelFilter::Info
        }
        else if args.quiet > 1 {
            self.log_level = LevelFilter::Off
        }
        else if args.quiet == 1 {
            self.log_level = LevelFilter::Error
        }

        Ok(())
    }

    /// Applies the logging-specific command line arguments to the config.
    ///
    /// This is the Unix version that also considers syslog as a valid
    /// target.
    #[cfg(unix)]
    fn apply_log_matches(
        &mut self,
        args: &GlobalArgs,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        if args.syslog {
            if let Some(facility) = args.syslog_facility.as_ref() {
                self.log_target = LogTarget::Syslog(
                    match Facility::from_str(facility) {
                        Ok(value) => value,
                        Err(_) => {
                            error!("Invalid value for syslog-facility.");
                            return Err(Failed);
                        }
                    }
                )
            }
            else if !matches!(self.log_target, LogTarget::Syslog(_)) {
                // If we don’t have a syslog facility already from the config
                // file, we use the default.
                self.log_target = LogTarget::Syslog(DEFAULT_SYSLOG_FACILITY)
            }
        }
        else if let Some(file) = args.logfile.as_ref() {
            if file == "-" {
                self.log_target = LogTarget::Stderr
            }
            else {
                self.log_target = LogTarget::File(cur_dir.join(file))
            }
        }
        Ok(())
    }

    /// Applies the logging-specific command line arguments to the config.
    ///
    /// This is the non-Unix version that does not use syslog.
    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps)]
    fn apply_log_matches(
        &mut self,
        args: &GlobalArgs,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        if let Some(file) = args.logfile.as_ref() {
            if file == "-" {
                self.log_target = LogTarget::Stderr
            }
            else {
                self.log_target = LogTarget::File(cur_dir.join(file))
            }
        }
        Ok(())
    }

    /// Applies the server command line arguments to an existing config.
    pub fn apply_server_arg_matches(
        &mut self,
        matches: &ArgMatches,
    ) -> Result<(), Failed> {
        let args = ServerArgs::from_arg_matches(
            matches
        ).expect("bug in command line arguments parser");

        // vhost_mode
        if let Some(mode) = args.vhost_mode {
            self.vhost_mode = mode
        }

        // http_listen
        if let Some(list) = args.http_listen {
            self.http_listen = list
        }

        // cache_max_age
        if let Some(value) = args.cache_max_age {
            self.cache_max_age = value
        }

        Ok(())
    }

    /// Returns a path value in arg matches.
    ///
    /// This expands a relative path based on the given directory.
    fn path_value_of(
        matches: &ArgMatches,
        key: &str,
        dir: &Path
    ) -> Option<PathBuf> {
        matches.get_one::<PathBuf>(key).map(|path| dir.join(path))
    }

    /// Creates the correct base configuration for the given config file path.
    ///
    /// If no config path is given, tries to read the default config in
    /// `$HOME/.dathost.conf`. If that doesn’t exist, creates a default
    /// config.
    fn create_base_config(path: Option<&Path>) -> Result<Self, Failed> {
        let file = match path {
            Some(path) => {
                match ConfigFile::read(path)? {
                    Some(file) => file,
                    None => {
                        error!("Cannot read config file {}", path.display());
                        return Err(Failed);
                    }
                }
            }
            None => {
                match home_dir() {
                    Some(dir) => match ConfigFile::read(
                        &dir.join(DEFAULT_CONFIG_FILE)
                    )? {
                        Some(file) => file,
                        None => return Ok(Self::default()),
                    }
                    None => return Ok(Self::default())
                }
            }
        };
        Self::from_config_file(file)
    }

    /// Creates a base config from a config file.
    ///
    /// Values missing from the file are taken from the default config.
    fn from_config_file(mut file: ConfigFile) -> Result<Self, Failed> {
        let default = Self::default();
        let log_target = Self::log_target_from_config_file(&mut file)?;
        let res = Config {
            archive_dir: {
                file.take_path("archive-dir")?.unwrap_or(default.archive_dir)
            },
            registry: file.take_path("registry")?,
            vhost_mode: {
                file.take_from_str("vhost-mode")?
                    .unwrap_or(default.vhost_mode)
            },
            http_listen: {
                file.take_from_str_array("http-listen")?
                    .unwrap_or(default.http_listen)
            },
            cache_max_age: {
                file.take_u64("cache-max-age")?
                    .unwrap_or(DEFAULT_CACHE_MAX_AGE)
            },
            log_level: {
                file.take_from_str("log-level")?.unwrap_or(LevelFilter::Warn)
            },
            log_target,
        };
        file.check_exhausted()?;
        Ok(res)
    }

    /// Determines the logging target from the config file.
    ///
    /// This is the Unix version that also deals with syslog.
    #[cfg(unix)]
    fn log_target_from_config_file(
        file: &mut ConfigFile
    ) -> Result<LogTarget, Failed> {
        let facility = file.take_string("syslog-facility")?;
        let facility = facility.as_ref().map(AsRef::as_ref)
                               .unwrap_or("daemon");
        let facility = match Facility::from_str(facility) {
            Ok(value) => value,
            Err(_) => {
                error!(
                    "Failed in config file {}: invalid syslog-facility.",
                    file.path.display()
                );
                return Err(Failed);
            }
        };
        let log_target = file.take_string("log")?;
        let log_file = file.take_path("log-file")?;
        match log_target.as_ref().map(AsRef::as_ref) {
            Some("default") | Some("stderr") | None => Ok(LogTarget::Stderr),
            Some("syslog") => Ok(LogTarget::Syslog(facility)),
            Some("file") => {
                match log_file {
                    Some(file) => Ok(LogTarget::File(file)),
                    None => {
                        error!(
                            "Failed in config file {}: \
                             log target \"file\" requires 'log-file' value.",
                            file.path.display()
                        );
                        Err(Failed)
                    }
                }
            }
            Some(value) => {
                error!(
                    "Failed in config file {}: \
                     invalid log target '{}'",
                     file.path.display(),
                     value
                );
                Err(Failed)
            }
        }
    }

    /// Determines the logging target from the config file.
    ///
    /// This is the non-Unix version that only logs to stderr or a file.
    #[cfg(not(unix))]
    fn log_target_from_config_file(
        file: &mut ConfigFile
    ) -> Result<LogTarget, Failed> {
        let log_target = file.take_string("log")?;
        let log_file = file.take_path("log-file")?;
        match log_target.as_ref().map(AsRef::as_ref) {
            Some("default") | Some("stderr") | None => Ok(LogTarget::Stderr),
            Some("file") => {
                match log_file {
                    Some(file) => Ok(LogTarget::File(file)),
                    None => {
                        error!(
                            "Failed in config file {}: \
                             log target \"file\" requires 'log-file' value.",
                            file.path.display()
                        );
                        Err(Failed)
                    }
                }
            }
            Some(value) => {
                error!(
                    "Failed in config file {}: \
                     invalid log target '{}'",
                    file.path.display(), value
                );
                Err(Failed)
            }
        }
    }

    /// Creates a default config with the given archive directory.
    fn default_with_archive_dir(archive_dir: PathBuf) -> Self {
        Config {
            archive_dir,
            registry: None,
            vhost_mode: VhostMode::default(),
            http_listen: vec![DEFAULT_HTTP_LISTEN],
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            log_level: LevelFilter::Warn,
            log_target: LogTarget::default(),
        }
    }

    /// Returns the path of the registry file.
    pub fn registry_path(&self) -> PathBuf {
        match self.registry {
            Some(ref path) => path.clone(),
            None => self.archive_dir.join(DEFAULT_REGISTRY_FILE),
        }
    }

    /// Returns a TOML representation of the config.
    pub fn to_toml(&self) -> toml::Value {
        let mut res = toml::value::Table::new();
        res.insert(
            "archive-dir".into(),
            self.archive_dir.display().to_string().into()
        );
        if let Some(ref path) = self.registry {
            res.insert(
                "registry".into(), path.display().to_string().into()
            );
        }
        res.insert("vhost-mode".into(), self.vhost_mode.to_string().into());
        res.insert(
            "http-listen".into(),
            toml::Value::Array(
                self.http_listen.iter().map(|a| a.to_string().into())
                    .collect()
            )
        );
        res.insert(
            "cache-max-age".into(),
            i64::try_from(self.cache_max_age).unwrap_or(i64::MAX).into()
        );
        res.insert("log-level".into(), self.log_level.to_string().into());
        match self.log_target {
            #[cfg(unix)]
            LogTarget::Syslog(facility) => {
                res.insert("log".into(), "syslog".into());
                res.insert(
                    "syslog-facility".into(),
                    facility_to_string(facility).into()
                );
            }
            LogTarget::Stderr => {
                res.insert("log".into(), "stderr".into());
            }
            LogTarget::File(ref file) => {
                res.insert("log".into(), "file".into());
                res.insert(
                    "log-file".into(),
                    file.display().to_string().into()
                );
            }
        }
        res.into()
    }
}


//--- Default

impl Default for Config {
    fn default() -> Self {
        match home_dir() {
            Some(dir) => {
                Config::default_with_archive_dir(dir.join(DEFAULT_ARCHIVE_DIR))
            }
            None => Config::default_with_archive_dir(PathBuf::from(""))
        }
    }
}


//--- Display

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_toml())
    }
}


//------------ LogTarget -----------------------------------------------------

/// The target to log to.
#[derive(Clone, Debug)]
pub enum LogTarget {
    /// Syslog.
    ///
    /// The argument is the syslog facility to use.
    #[cfg(unix)]
    Syslog(Facility),

    /// Stderr.
    Stderr,

    /// A file.
    ///
    /// The argument is the file name.
    File(PathBuf)
}


//--- Default

impl Default for LogTarget {
    fn default() -> Self {
        LogTarget::Stderr
    }
}


//--- PartialEq and Eq

impl PartialEq for LogTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            #[cfg(unix)]
            (&LogTarget::Syslog(s), &LogTarget::Syslog(o)) => {
                (s as usize) == (o as usize)
            }
            (&LogTarget::Stderr, &LogTarget::Stderr) => true,
            (&LogTarget::File(ref s), &LogTarget::File(ref o)) => {
                s == o
            }
            _ => false
        }
    }
}

impl Eq for LogTarget { }


//------------ GlobalArgs ----------------------------------------------------

/// The global command line arguments.
#[derive(Clone, Debug, Parser)]
struct GlobalArgs {
    /// Read base configuration from this file
    #[arg(short, long, value_name="PATH")]
    config: Option<PathBuf>,

    /// Sets the directory the archives are kept in
    #[arg(short = 'd', long, value_name="PATH")]
    archive_dir: Option<PathBuf>,

    /// Sets the registry file with users and archives
    #[arg(short, long, value_name="PATH")]
    registry: Option<PathBuf>,

    /// Log more information, twice for even more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log less information, twice for no information
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,

    /// Log to syslog
    #[cfg(unix)]
    #[arg(long)]
    syslog: bool,

    /// Facility to use for syslog logging
    #[cfg(unix)]
    #[arg(long, value_name = "FACILITY")]
    syslog_facility: Option<String>,

    /// Log to this file
    #[arg(long, value_name = "PATH")]
    logfile: Option<String>,
}


//------------ ServerArgs ----------------------------------------------------

/// The server-related command line arguments.
#[derive(Clone, Debug, Parser)]
struct ServerArgs {
    /// How host names map to archives ('archive' or 'user')
    #[arg(long, value_name = "MODE")]
    vhost_mode: Option<VhostMode>,

    /// Listen on address/port for HTTP
    #[arg(long = "http", value_name = "ADDR:PORT")]
    http_listen: Option<Vec<SocketAddr>>,

    /// Max-age of cached file responses in seconds [default 60]
    #[arg(long, value_name = "SECONDS")]
    cache_max_age: Option<u64>,
}


//------------ ConfigFile ----------------------------------------------------

/// The content of a config file.
///
/// This is a thin wrapper around `toml::Table` to make dealing with it more
/// convenient.
#[derive(Clone, Debug)]
struct ConfigFile {
    /// The content of the file.
    content: toml::value::Table,

    /// The path to the config file.
    path: PathBuf,

    /// The directory we found the file in.
    ///
    /// This is used in relative paths.
    dir: PathBuf,
}

impl ConfigFile {
    /// Reads the config file at the given path.
    ///
    /// If there is no such file, returns `None`. If there is a file but it
    /// is broken, aborts.
    #[allow(clippy::verbose_file_reads)]
    fn read(path: &Path) -> Result<Option<Self>, Failed> {
        let mut file = match fs::File::open(path) {
            Ok(file) => file,
            Err(_) => return Ok(None)
        };
        let mut config = String::new();
        if let Err(err) = file.read_to_string(&mut config) {
            error!(
                "Failed to read config file {}: {}",
                path.display(), err
            );
            return Err(Failed);
        }
        Self::parse(&config, path).map(Some)
    }

    /// Parses the content of the file from a string.
    fn parse(content: &str, path: &Path) -> Result<Self, Failed> {
        let content = match toml::from_str(content) {
            Ok(toml::Value::Table(content)) => content,
            Ok(_) => {
                error!(
                    "Failed to parse config file {}: Not a mapping.",
                    path.display()
                );
                return Err(Failed);
            }
            Err(err) => {
                error!(
                    "Failed to parse config file {}: {}",
                    path.display(), err
                );
                return Err(Failed);
            }
        };
        let path = if path.is_relative() {
            match env::current_dir() {
                Ok(dir) => dir.join(path),
                Err(err) => {
                    error!(
                        "Fatal: Can't determine current directory: {}.",
                        err
                    );
                    return Err(Failed);
                }
            }
        }
        else {
            path.into()
        };
        let dir = match path.parent() {
            Some(dir) => dir.into(),
            None => PathBuf::from("/"),
        };
        Ok(ConfigFile { content, path, dir })
    }

    /// Takes an unsigned integer value from the config file.
    ///
    /// The value is taken from the given `key`. Returns `Ok(None)` if there
    /// is no such key. Returns an error if the key exists but the value
    /// isn’t an integer or if it is negative.
    fn take_u64(&mut self, key: &str) -> Result<Option<u64>, Failed> {
        match self.content.remove(key) {
            Some(value) => {
                if let toml::Value::Integer(res) = value {
                    u64::try_from(res).map(Some).map_err(|_| {
                        error!(
                            "Failed in config file {}: \
                            '{}' expected to be a positive integer.",
                            self.path.display(), key
                        );
                        Failed
                    })
                }
                else {
                    error!(
                        "Failed in config file {}: \
                         '{}' expected to be an integer.",
                        self.path.display(), key
                    );
                    Err(Failed)
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a string value from the config file.
    ///
    /// The value is taken from the given `key`. Returns `Ok(None)` if there
    /// is no such key. Returns an error if the key exists but the value
    /// isn’t a string.
    fn take_string(&mut self, key: &str) -> Result<Option<String>, Failed> {
        match self.content.remove(key) {
            Some(value) => {
                if let toml::Value::String(res) = value {
                    Ok(Some(res))
                }
                else {
                    error!(
                        "Failed in config file {}: \
                         '{}' expected to be a string.",
                        self.path.display(), key
                    );
                    Err(Failed)
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a string encoded value from the config file.
    ///
    /// The value is taken from the given `key`. It is expected to be a
    /// string and will be converted to the final type via `FromStr::from_str`.
    ///
    /// Returns `Ok(None)` if the key doesn’t exist. Returns an error if the
    /// key exists but the value isn’t a string or conversion fails.
    fn take_from_str<T>(&mut self, key: &str) -> Result<Option<T>, Failed>
    where T: FromStr, T::Err: fmt::Display {
        match self.take_string(key)? {
            Some(value) => {
                match T::from_str(&value) {
                    Ok(some) => Ok(Some(some)),
                    Err(err) => {
                        error!(
                            "Failed in config file {}: \
                             illegal value in '{}': {}.",
                            self.path.display(), key, err
                        );
                        Err(Failed)
                    }
                }
            }
            None => Ok(None)
        }
    }

    /// Takes a path value from the config file.
    ///
    /// The path is taken from the given `key`. It must be a string value.
    /// It is treated as relative to the directory of the config file. If it
    /// is indeed a relative path, it is expanded accordingly and an absolute
    /// path is returned.
    ///
    /// Returns `Ok(None)` if the key does not exist. Returns an error if the
    /// key exists but the value isn’t a string.
    fn take_path(&mut self, key: &str) -> Result<Option<PathBuf>, Failed> {
        self.take_string(key).map(|opt| opt.map(|path| self.dir.join(path)))
    }

    /// Takes an array of string encoded values from the config file.
    ///
    /// The value is taken from the entry with the given `key` and, if
    /// present, the entry is removed. The value must be an array of strings.
    /// Each string is converted to the output type via `FromStr::from_str`.
    ///
    /// If the key is not present, returns `Ok(None)`. If the entry is present
    /// but not an array of strings or if converting any of the strings fails,
    /// returns an error.
    fn take_from_str_array<T>(
        &mut self,
        key: &str
    ) -> Result<Option<Vec<T>>, Failed>
    where T: FromStr, T::Err: fmt::Display {
        match self.content.remove(key) {
            Some(toml::Value::Array(vec)) => {
                let mut res = Vec::new();
                for value in vec.into_iter() {
                    if let toml::Value::String(value) = value {
                        match T::from_str(&value) {
                            Ok(value) => res.push(value),
                            Err(err) => {
                                error!(
                                    "Failed in config file {}: \
                                     Invalid value in '{}': {}",
                                    self.path.display(), key, err
                                );
                                return Err(Failed)
                            }
                        }
                    }
                    else {
                        error!(
                            "Failed in config file {}: \
                            '{}' expected to be a array of strings.",
                            self.path.display(),
                            key
                        );
                        return Err(Failed)
                    }
                }
                Ok(Some(res))
            }
            Some(_) => {
                error!(
                    "Failed in config file {}: \
                     '{}' expected to be a array of strings.",
                    self.path.display(), key
                );
                Err(Failed)
            }
            None => Ok(None)
        }
    }

    /// Checks whether the config file is now empty.
    ///
    /// If it isn’t, logs a complaint and returns an error.
    fn check_exhausted(&self) -> Result<(), Failed> {
        if !self.content.is_empty() {
            error!(
                "Failed in config file {}: Unknown settings {}.",
                self.path.display(),
                self.content.keys().map(String::as_str)
                    .collect::<Vec<_>>().join(", ")
            );
            Err(Failed)
        }
        else {
            Ok(())
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Converts the syslog facility name to the facility type.
#[cfg(unix)]
fn facility_to_string(facility: Facility) -> String {
    use syslog::Facility::*;

    match facility {
        LOG_KERN => "kern",
        LOG_USER => "user",
        LOG_MAIL => "mail",
        LOG_DAEMON => "daemon",
        LOG_AUTH => "auth",
        LOG_SYSLOG => "syslog",
        LOG_LPR => "lpr",
        LOG_NEWS => "news",
        LOG_UUCP => "uucp",
        LOG_CRON => "cron",
        LOG_AUTHPRIV => "authpriv",
        LOG_FTP => "ftp",
        LOG_LOCAL0 => "local0",
        LOG_LOCAL1 => "local1",
        LOG_LOCAL2 => "local2",
        LOG_LOCAL3 => "local3",
        LOG_LOCAL4 => "local4",
        LOG_LOCAL5 => "local5",
        LOG_LOCAL6 => "local6",
        LOG_LOCAL7 => "local7",
    }.into()
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    fn get_default_config() -> Config {
        // Set $HOME so that home_dir always succeeds.
        ::std::env::set_var("HOME", "/home/test");
        Config::default()
    }

    fn process_basic_args(args: &[&str]) -> Config {
        let mut config = get_default_config();
        config.apply_arg_matches(
            &Config::config_args(Command::new("dathost"))
                .get_matches_from(args),
            Path::new("/test")
        ).unwrap();
        config
    }

    fn process_server_args(args: &[&str]) -> Config {
        let mut config = get_default_config();
        let matches = Config::server_args(Config::config_args(
                Command::new("dathost"))
        ).get_matches_from(args);
        config.apply_arg_matches(&matches, Path::new("/test")).unwrap();
        config.apply_server_arg_matches(&matches).unwrap();
        config
    }

    #[test]
    #[cfg(unix)]
    fn default_config() {
        let config = get_default_config();
        assert_eq!(
            config.archive_dir,
            home_dir().unwrap().join(".dathost").join("archives")
        );
        assert_eq!(
            config.registry_path(),
            home_dir().unwrap().join(".dathost/archives/registry.toml")
        );
        assert_eq!(config.vhost_mode, VhostMode::PerArchive);
        assert_eq!(config.http_listen, [DEFAULT_HTTP_LISTEN]);
        assert_eq!(config.cache_max_age, 60);
        assert_eq!(config.log_level, LevelFilter::Warn);
        assert_eq!(config.log_target, LogTarget::Stderr);
    }

    #[test]
    #[cfg(unix)] // ... because of drive letters in absolute paths on Windows.
    fn good_config_file() {
        let config = ConfigFile::parse(
            "archive-dir = \"archives\"\n\
             registry = \"/etc/dathost/registry.toml\"\n\
             vhost-mode = \"user\"\n\
             http-listen = [\"[2001:db8::4]:80\", \"192.0.2.4:8080\"]\n\
             cache-max-age = 3600\n\
             log-level = \"info\"\n\
             log = \"file\"\n\
             log-file = \"foo.log\"",
            Path::new("/test/dathost.conf")
        ).unwrap();
        let config = Config::from_config_file(config).unwrap();
        assert_eq!(config.archive_dir.to_str().unwrap(), "/test/archives");
        assert_eq!(
            config.registry_path().to_str().unwrap(),
            "/etc/dathost/registry.toml"
        );
        assert_eq!(config.vhost_mode, VhostMode::PerUser);
        assert_eq!(
            config.http_listen,
            vec![
                SocketAddr::from_str("[2001:db8::4]:80").unwrap(),
                SocketAddr::from_str("192.0.2.4:8080").unwrap(),
            ]
        );
        assert_eq!(config.cache_max_age, 3600);
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(
            config.log_target,
            LogTarget::File(PathBuf::from("/test/foo.log"))
        );
    }

    #[test]
    #[cfg(unix)] // ... because of drive letters in absolute paths on Windows.
    fn minimal_config_file() {
        let config = ConfigFile::parse(
            "archive-dir = \"/srv/dat\"",
            Path::new("/test/dathost.conf")
        ).unwrap();
        let config = Config::from_config_file(config).unwrap();
        assert_eq!(config.archive_dir.to_str().unwrap(), "/srv/dat");
        assert_eq!(
            config.registry_path().to_str().unwrap(),
            "/srv/dat/registry.toml"
        );
        assert_eq!(config.vhost_mode, VhostMode::PerArchive);
        assert_eq!(config.http_listen, [DEFAULT_HTTP_LISTEN]);
        assert_eq!(config.cache_max_age, DEFAULT_CACHE_MAX_AGE);
        assert_eq!(config.log_level, LevelFilter::Warn);
        assert_eq!(config.log_target, LogTarget::default());
    }

    #[test]
    fn bad_config_file() {
        assert!(ConfigFile::parse(
            "archive-dir = ", Path::new("/test/dathost.conf")
        ).is_err());
        let config = ConfigFile::parse(
            "archive-dir = 12", Path::new("/test/dathost.conf")
        ).unwrap();
        assert!(Config::from_config_file(config).is_err());
        let config = ConfigFile::parse(
            "vhost-mode = \"host\"", Path::new("/test/dathost.conf")
        ).unwrap();
        assert!(Config::from_config_file(config).is_err());
        let config = ConfigFile::parse(
            "cache-max-age = -1", Path::new("/test/dathost.conf")
        ).unwrap();
        assert!(Config::from_config_file(config).is_err());
        let config = ConfigFile::parse(
            "log = \"file\"", Path::new("/test/dathost.conf")
        ).unwrap();
        assert!(Config::from_config_file(config).is_err());
        let config = ConfigFile::parse(
            "tal-dir = \"tals\"", Path::new("/test/dathost.conf")
        ).unwrap();
        assert!(Config::from_config_file(config).is_err());
    }

    #[test]
    fn read_your_own_config() {
        let mut out_config = get_default_config();
        out_config.registry = Some(PathBuf::from("/test/registry.toml"));
        out_config.vhost_mode = VhostMode::PerUser;
        let out_file = format!("{}", out_config.to_toml());
        let in_file = ConfigFile::parse(
            &out_file, Path::new("/test/dathost.conf")
        ).unwrap();
        let in_config = Config::from_config_file(in_file).unwrap();
        assert_eq!(out_config, in_config);
    }

    #[test]
    #[cfg(unix)]
    fn basic_args() {
        let config = process_basic_args(&[
            "dathost", "-d", "archives", "-r", "/registry.toml",
            "--syslog", "--syslog-facility", "auth"
        ]);
        assert_eq!(config.archive_dir, Path::new("/test/archives"));
        assert_eq!(config.registry_path(), Path::new("/registry.toml"));
        assert_eq!(config.log_target, LogTarget::Syslog(Facility::LOG_AUTH));

        let config = process_basic_args(&[
            "dathost", "--archive-dir", "/srv/dat", "--logfile", "dat.log"
        ]);
        assert_eq!(
            config.registry_path(), Path::new("/srv/dat/registry.toml")
        );
        assert_eq!(
            config.log_target, LogTarget::File("/test/dat.log".into())
        );
    }

    #[test]
    fn verbosity() {
        let config = process_basic_args(&["dathost"]);
        assert_eq!(config.log_level, LevelFilter::Warn);
        let config = process_basic_args(&["dathost", "-v"]);
        assert_eq!(config.log_level, LevelFilter::Info);
        let config = process_basic_args(&["dathost", "-vv"]);
        assert_eq!(config.log_level, LevelFilter::Debug);
        let config = process_basic_args(&["dathost", "-q"]);
        assert_eq!(config.log_level, LevelFilter::Error);
        let config = process_basic_args(&["dathost", "-qq"]);
        assert_eq!(config.log_level, LevelFilter::Off);
    }

    #[test]
    fn server_args() {
        let config = process_server_args(&[
            "dathost", "--vhost-mode", "user",
            "--http", "[2001:db8::4]:80",
            "--http", "192.0.2.4:8080",
            "--cache-max-age", "0",
        ]);
        assert_eq!(config.vhost_mode, VhostMode::PerUser);
        assert_eq!(
            config.http_listen,
            vec![
                SocketAddr::from_str("[2001:db8::4]:80").unwrap(),
                SocketAddr::from_str("192.0.2.4:8080").unwrap(),
            ]
        );
        assert_eq!(config.cache_max_age, 0);
    }

    #[test]
    fn check_args() {
        crate::operation::Operation::config_args(
            GlobalArgs::augment_args(Command::new("test"))
        ).debug_assert();
    }
}
