//! Run configuration and path filtering.

use regex::Regex;

use crate::block::{BlockId, BlockKind, BlockTree};
use crate::error::ConfigError;

/// Frames of a fault's trace shown per failure unless configured otherwise.
pub const DEFAULT_TRACE_DEPTH: usize = 7;

/// Configuration parsed from command-line args and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Only run examples whose path matches this regex.
    pub grep: Option<String>,
    /// Skip examples whose path matches this regex.
    pub except: Option<String>,
    /// Only list example paths, don't run them.
    pub list: bool,
    /// Trace frames shown per failure.
    pub trace_depth: usize,
    /// Disable ANSI colors.
    pub no_color: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            grep: None,
            except: None,
            list: false,
            trace_depth: DEFAULT_TRACE_DEPTH,
            no_color: false,
        }
    }
}

impl RunConfig {
    /// Parse from the process args (compatible with `cargo test -- <args>`),
    /// then overlay `NESTSPEC_*` environment variables for anything unset.
    pub fn from_args() -> Result<Self, ConfigError> {
        let mut config = Self::parse(std::env::args().skip(1))?;
        config.overlay_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse an argument list (without the binary name). Unknown flags are
    /// ignored so the harness' own flags pass through.
    pub fn parse<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = RunConfig::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--list" => config.list = true,
                "--no-color" => config.no_color = true,
                "--grep" => config.grep = Some(value_for(&arg, args.next())?),
                "--except" => config.except = Some(value_for(&arg, args.next())?),
                "--trace-depth" => {
                    let value = value_for(&arg, args.next())?;
                    config.trace_depth = parse_depth(&arg, &value)?;
                }
                flag if flag.starts_with('-') => {
                    tracing::trace!(flag, "ignoring unknown flag");
                }
                _ => config.grep = Some(arg),
            }
        }

        Ok(config)
    }

    /// Fill unset options from the environment. Flags given on the command
    /// line win.
    pub fn overlay_env(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let set = |key: &str| var(key).filter(|v| !v.is_empty());

        if self.grep.is_none() {
            self.grep = set("NESTSPEC_GREP");
        }
        if self.except.is_none() {
            self.except = set("NESTSPEC_EXCEPT");
        }
        if self.trace_depth == DEFAULT_TRACE_DEPTH {
            if let Some(value) = set("NESTSPEC_TRACE_DEPTH") {
                self.trace_depth = parse_depth("NESTSPEC_TRACE_DEPTH", &value)?;
            }
        }
        // https://no-color.org/: any value, even empty, disables color
        if var("NO_COLOR").is_some() {
            self.no_color = true;
        }
        Ok(())
    }

    /// Compile the grep/except patterns.
    pub fn filter(&self) -> Result<Filter, ConfigError> {
        Ok(Filter {
            grep: compile("grep", self.grep.as_deref())?,
            except: compile("except", self.except.as_deref())?,
        })
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse_depth(flag: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

/// Accepts both `pattern` and the slash-delimited `/pattern/` form.
fn compile(which: &'static str, pattern: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    let Some(pattern) = pattern else {
        return Ok(None);
    };
    let body = pattern
        .strip_prefix('/')
        .and_then(|p| p.strip_suffix('/'))
        .unwrap_or(pattern);
    Regex::new(body)
        .map(Some)
        .map_err(|source| ConfigError::InvalidPattern {
            which,
            pattern: pattern.to_string(),
            source,
        })
}

/// Inclusion and exclusion patterns tested against block paths. A missing
/// pattern matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    grep: Option<Regex>,
    except: Option<Regex>,
}

impl Filter {
    /// A filter that keeps everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(grep: Option<&str>, except: Option<&str>) -> Result<Self, ConfigError> {
        Ok(Filter {
            grep: compile("grep", grep)?,
            except: compile("except", except)?,
        })
    }

    pub fn grep(pattern: &str) -> Result<Self, ConfigError> {
        Self::new(Some(pattern), None)
    }

    pub fn except(pattern: &str) -> Result<Self, ConfigError> {
        Self::new(None, Some(pattern))
    }

    pub fn is_empty(&self) -> bool {
        self.grep.is_none() && self.except.is_none()
    }

    /// Whether a path passes: matches grep and does not match except.
    pub fn matches_path(&self, path: &str) -> bool {
        let included = self.grep.as_ref().map_or(true, |re| re.is_match(path));
        let excluded = self.except.as_ref().is_some_and(|re| re.is_match(path));
        included && !excluded
    }

    /// Whether `id` is excluded from the run. Examples are tested by path;
    /// groups are kept when any descendant example is kept. The suite root is
    /// never filtered.
    pub fn is_filtered(&self, tree: &BlockTree, id: BlockId) -> bool {
        match tree.kind(id) {
            BlockKind::Suite => false,
            BlockKind::Example => !self.matches_path(&tree.path(id)),
            BlockKind::Describe => {
                tree.examples(id)
                    .iter()
                    .all(|&example| self.is_filtered(tree, example))
                    && tree
                        .describes(id)
                        .iter()
                        .all(|&describe| self.is_filtered(tree, describe))
            }
            // Hooks follow the examples that pull them in.
            _ => false,
        }
    }
}
