//! Clojure code fragments sent on behalf of commands.

use std::path::Path;

/// Function invoked when `run` names only a namespace.
const DEFAULT_ENTRY_POINT: &str = "-main";

/// Quote `s` as a Clojure string literal.
#[must_use]
pub fn clojure_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn string_args(args: &[String]) -> String {
    args.iter()
        .map(|a| clojure_string(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Code that requires `ns`, calls the target function with `args` as strings
/// and evaluates to an exit code.
///
/// `target` is `ns/function` or a bare `ns`, which calls `-main`. An
/// `ExceptionInfo` carrying `:exit-code` yields that code; anything else
/// propagates as an evaluation error.
#[must_use]
pub fn run_form(target: &str, args: &[String]) -> String {
    let (ns, function) = match target.split_once('/') {
        Some((ns, function)) if !function.is_empty() => (ns, function),
        Some((ns, _)) => (ns, DEFAULT_ENTRY_POINT),
        None => (target, DEFAULT_ENTRY_POINT),
    };
    let var = format!("{ns}/{function}");
    let args = string_args(args);

    format!(
        "(try (require '{ns}) \
         (if-let [f (resolve '{var})] \
         (do (f {args}) 0) \
         (throw (ex-info \"Could not resolve {var}\" {{:exit-code 1}}))) \
         (catch clojure.lang.ExceptionInfo e \
         (if-let [code (:exit-code (ex-data e))] code (throw e))))"
    )
}

/// Code that runs a Leiningen task inside the server and evaluates to its
/// exit code.
///
/// The project is switched to evaluate in this nREPL session, and Leiningen's
/// exit-process mode is turned off so a failing task cannot kill the server.
#[must_use]
pub fn lein_form(project_root: &Path, session: &str, args: &[String]) -> String {
    let root = clojure_string(&project_root.to_string_lossy());
    let project_file = clojure_string(&project_root.join("project.clj").to_string_lossy());
    let session = clojure_string(session);
    let args = string_args(args);

    format!(
        "(do (require 'leiningen.core.main 'leiningen.core.project) \
         (binding [leiningen.core.main/*cwd* {root} \
         leiningen.core.main/*exit-process?* false] \
         (let [project (-> (leiningen.core.project/read {project_file}) \
         (assoc :eval-in :nrepl) \
         (assoc-in [:repl-options :session] {session}))] \
         (try (leiningen.core.main/resolve-and-apply project [{args}]) 0 \
         (catch clojure.lang.ExceptionInfo e \
         (:exit-code (ex-data e) 1))))))"
    )
}

/// Wrap a line of repl input so exceptions print remotely instead of
/// failing the evaluation.
#[must_use]
pub fn repl_form(input: &str) -> String {
    format!("(try {input}\n(catch Throwable t (clojure.repl/pst t) nil))")
}

/// Exit code carried by an evaluation's printed value, reduced to the low
/// byte the operating system keeps. Non-numeric is 0.
#[must_use]
pub fn exit_code(value: Option<&str>) -> i32 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|code| i32::try_from(code.rem_euclid(256)).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_run_named_function() {
        let code = run_form("app.tasks/seed", &strings(&["a", "b"]));
        assert!(code.contains("(require 'app.tasks)"));
        assert!(code.contains("(resolve 'app.tasks/seed)"));
        assert!(code.contains("(f \"a\" \"b\")"));
        assert!(!code.contains("-main"));
    }

    #[test]
    fn test_run_namespace_defaults_to_main() {
        let code = run_form("app.core", &[]);
        assert!(code.contains("(require 'app.core)"));
        assert!(code.contains("(resolve 'app.core/-main)"));

        let code = run_form("app.core/", &[]);
        assert!(code.contains("(resolve 'app.core/-main)"));
    }

    #[test]
    fn test_run_escapes_arguments() {
        let code = run_form("app.core", &strings(&[r#"say "hi"\now"#]));
        assert!(code.contains(r#"(f "say \"hi\"\\now")"#));
    }

    #[test]
    fn test_lein_form() {
        let code = lein_form(Path::new("/work/app"), "s-1", &strings(&["test", ":only", "app.core-test"]));
        assert!(code.contains("leiningen.core.main/*cwd* \"/work/app\""));
        assert!(code.contains("(leiningen.core.project/read \"/work/app/project.clj\")"));
        assert!(code.contains("(assoc :eval-in :nrepl)"));
        assert!(code.contains("[:repl-options :session] \"s-1\""));
        assert!(code.contains("*exit-process?* false"));
        assert!(code.contains("[\"test\" \":only\" \"app.core-test\"]"));
    }

    #[test]
    fn test_repl_form_survives_trailing_comment() {
        let code = repl_form("(+ 1 2) ; sum");
        assert!(code.starts_with("(try (+ 1 2) ; sum\n(catch Throwable t"));
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(Some("0")), 0);
        assert_eq!(exit_code(Some("3\n")), 3);
        assert_eq!(exit_code(Some("nil")), 0);
        assert_eq!(exit_code(None), 0);
        assert_eq!(exit_code(Some("-1")), 255);
        assert_eq!(exit_code(Some("300")), 44);
        // Clojure longs wider than 32 bits keep their low byte.
        assert_eq!(exit_code(Some("4294967297")), 1);
    }
}
