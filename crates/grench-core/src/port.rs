//! Discovery of the port a running server listens on.

use std::path::{Path, PathBuf};

use crate::Config;

/// Resolves the server port from, in order: the override, the project
/// marker file, the global marker file.
#[derive(Debug, Clone)]
pub struct PortResolver {
    port_override: Option<String>,
    working_dir: PathBuf,
    project_file: String,
    port_file: String,
    global_port_path: Option<PathBuf>,
}

impl PortResolver {
    /// Create a resolver from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            port_override: config.port_override.clone(),
            working_dir: config.working_dir.clone(),
            project_file: config.project_file.clone(),
            port_file: config.port_file.clone(),
            global_port_path: config.global_port_path(),
        }
    }

    /// Find the port, or `None` when no source names one.
    ///
    /// Inside a project the project marker is authoritative: a missing
    /// marker there means no server, even if the global marker exists.
    #[must_use]
    pub fn resolve(&self) -> Option<u16> {
        if let Some(port) = self.port_override.as_deref().and_then(parse_port) {
            tracing::debug!(port, "Port from environment");
            return Some(port);
        }

        if let Some(root) = find_project_root(&self.working_dir, &self.project_file) {
            let port = read_port_file(&root.join(&self.port_file));
            tracing::debug!(root = %root.display(), ?port, "Port from project marker");
            return port;
        }

        let port = self.global_port_path.as_deref().and_then(read_port_file);
        tracing::debug!(?port, "Port from global marker");
        port
    }
}

/// Walk upward from `start` to the nearest directory containing `project_file`.
#[must_use]
pub fn find_project_root(start: &Path, project_file: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(project_file).is_file())
        .map(Path::to_path_buf)
}

fn read_port_file(path: &Path) -> Option<u16> {
    let contents = std::fs::read_to_string(path).ok()?;
    parse_port(&contents)
}

/// Parse decimal text, rejecting anything that is not all digits.
fn parse_port(text: &str) -> Option<u16> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        _tmp: TempDir,
        home: PathBuf,
        project: PathBuf,
        outside: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let home = tmp.path().join("home");
            let project = tmp.path().join("work").join("app");
            let outside = tmp.path().join("scratch");
            fs::create_dir_all(home.join(".lein")).unwrap();
            fs::create_dir_all(project.join("src").join("app")).unwrap();
            fs::create_dir_all(&outside).unwrap();
            fs::write(project.join("project.clj"), "(defproject app \"0.1.0\")").unwrap();
            Self {
                _tmp: tmp,
                home,
                project,
                outside,
            }
        }

        fn config(&self, dir: &Path) -> Config {
            Config::new(dir.to_path_buf()).with_home_dir(Some(self.home.clone()))
        }

        fn project_marker(&self, contents: &str) {
            fs::write(self.project.join(".nrepl-port"), contents).unwrap();
        }

        fn global_marker(&self, contents: &str) {
            fs::write(self.home.join(".lein").join("repl-port"), contents).unwrap();
        }
    }

    #[test]
    fn test_project_marker_from_root() {
        let fx = Fixture::new();
        fx.project_marker("55555\n");
        let resolver = PortResolver::new(&fx.config(&fx.project));
        assert_eq!(resolver.resolve(), Some(55555));
    }

    #[test]
    fn test_project_marker_found_from_subdirectory() {
        let fx = Fixture::new();
        fx.project_marker("4001");
        let resolver = PortResolver::new(&fx.config(&fx.project.join("src").join("app")));
        assert_eq!(resolver.resolve(), Some(4001));
    }

    #[test]
    fn test_precedence_over_all_combinations() {
        for env in [false, true] {
            for project in [false, true] {
                for global in [false, true] {
                    let fx = Fixture::new();
                    let mut config = fx.config(&fx.project);
                    if env {
                        config = config.with_port_override("1111");
                    }
                    if project {
                        fx.project_marker("2222");
                    }
                    if global {
                        fx.global_marker("3333");
                    }

                    let expected = if env {
                        Some(1111)
                    } else if project {
                        Some(2222)
                    } else {
                        // Inside a project without a marker the global file is not consulted.
                        None
                    };
                    assert_eq!(
                        PortResolver::new(&config).resolve(),
                        expected,
                        "env={env} project={project} global={global}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_global_marker_outside_project() {
        let fx = Fixture::new();
        fx.global_marker("3333\n");
        let resolver = PortResolver::new(&fx.config(&fx.outside));
        assert_eq!(resolver.resolve(), Some(3333));
    }

    #[test]
    fn test_nothing_found() {
        let fx = Fixture::new();
        let resolver = PortResolver::new(&fx.config(&fx.outside));
        assert_eq!(resolver.resolve(), None);
    }

    #[test]
    fn test_non_digit_contents_are_absent() {
        let fx = Fixture::new();
        fx.project_marker("port=55555");
        assert_eq!(PortResolver::new(&fx.config(&fx.project)).resolve(), None);

        let fx = Fixture::new();
        fx.global_marker("-1");
        assert_eq!(PortResolver::new(&fx.config(&fx.outside)).resolve(), None);
    }

    #[test]
    fn test_bad_override_falls_through() {
        let fx = Fixture::new();
        fx.project_marker("2222");
        let config = fx.config(&fx.project).with_port_override("abc");
        assert_eq!(PortResolver::new(&config).resolve(), Some(2222));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(" 7888 \n"), Some(7888));
        assert_eq!(parse_port(""), None);
        assert_eq!(parse_port("12a"), None);
        assert_eq!(parse_port("99999999"), None);
    }
}
