use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use auh_core::{BuildSystem, ToolError, ToolResult};

// Emitted when several providers satisfy one dependency; the dependency
// dump is still written, so extraction proceeds with what it got.
const MULTIPLE_PROVIDERS_MARKER: &str = "Multiple .bb files are due to be built";

/// Build-system collaborator backed by the `bitbake` and `devtool` CLIs.
/// Assumes the build environment has been sourced by the caller.
#[derive(Debug, Clone)]
pub struct Bitbake {
    build_dir: PathBuf,
}

impl Bitbake {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    fn run(&self, action: &str, program: &str, args: &[&str], env: &[(&str, &str)]) -> ToolResult<String> {
        let mut command = Command::new(program);
        command.args(args).current_dir(&self.build_dir);
        for (key, value) in env {
            command.env(key, value);
        }

        let output = command.output().map_err(|err| {
            ToolError::new(
                program,
                action,
                format!("failed launching {program}: {err}"),
                "",
            )
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            let summary = stderr
                .lines()
                .chain(stdout.lines())
                .find(|line| !line.trim().is_empty())
                .unwrap_or("non-zero exit status")
                .to_string();
            return Err(ToolError::new(
                program,
                action,
                summary,
                format!("{stdout}{stderr}"),
            ));
        }

        Ok(stdout)
    }

    fn dependency_dump_path(&self) -> PathBuf {
        self.build_dir.join("pn-depends.dot")
    }
}

impl BuildSystem for Bitbake {
    fn env(&self, recipe: &str) -> ToolResult<String> {
        self.run("env", "bitbake", &["-e", recipe], &[])
    }

    fn upstream_check(&self, targets: &[String]) -> ToolResult<PathBuf> {
        let mut args = vec!["-c", "checkpkg"];
        args.extend(targets.iter().map(String::as_str));
        self.run("upstream-check", "bitbake", &args, &[])?;

        let report = self.build_dir.join("tmp").join("log").join("checkpkg.csv");
        if !report.is_file() {
            return Err(ToolError::new(
                "bitbake",
                "upstream-check",
                format!("scan finished but report is missing: {}", report.display()),
                "",
            ));
        }
        Ok(report)
    }

    fn dependency_edges(&self, recipes: &[String]) -> ToolResult<Vec<(String, String)>> {
        let mut args = vec!["-g"];
        args.extend(recipes.iter().map(String::as_str));
        if let Err(err) = self.run("dependency-graph", "bitbake", &args, &[]) {
            if !err.output_contains(MULTIPLE_PROVIDERS_MARKER) {
                return Err(err);
            }
            info!("dependency graph reported multiple providers, using extracted edges");
        }

        let dump_path = self.dependency_dump_path();
        let content = fs::read_to_string(&dump_path).map_err(|io_err| {
            ToolError::new(
                "bitbake",
                "dependency-graph",
                format!("failed reading dependency dump: {}", dump_path.display()),
                io_err.to_string(),
            )
        })?;
        Ok(parse_dependency_dump(&content))
    }

    fn unpack(&self, recipe: &str) -> ToolResult<()> {
        self.run("unpack", "bitbake", &["-c", "unpack", recipe], &[])
            .map(|_| ())
    }

    fn fetch(&self, recipe: &str) -> ToolResult<()> {
        self.run("fetch", "bitbake", &["-c", "fetch", recipe], &[])
            .map(|_| ())
    }

    fn cleanall(&self, recipe: &str) -> ToolResult<()> {
        self.run("cleanall", "bitbake", &["-c", "cleanall", recipe], &[])
            .map(|_| ())
    }

    fn rename(&self, recipe: &str, new_version: &str) -> ToolResult<()> {
        self.run(
            "rename",
            "devtool",
            &["rename", recipe, "--version", new_version],
            &[],
        )
        .map(|_| ())
    }

    fn compile(&self, recipe: &str, machine: &str) -> ToolResult<()> {
        self.run("compile", "bitbake", &[recipe], &[("MACHINE", machine)])
            .map(|_| ())
    }
}

/// Parses the dot-format dependency dump into `(recipe, depends_on)`
/// pairs. Lines that are not plain edges (headers, style attributes) are
/// ignored.
fn parse_dependency_dump(content: &str) -> Vec<(String, String)> {
    let mut edges = Vec::new();
    for line in content.lines() {
        let Some((left, right)) = line.split_once("->") else {
            continue;
        };
        let name = left.trim().trim_matches('"');
        let target = right
            .trim()
            .trim_end_matches(';')
            .split('[')
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"');
        if name.is_empty() || target.is_empty() {
            continue;
        }
        edges.push((name.to_string(), target.to_string()));
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::parse_dependency_dump;

    #[test]
    fn dump_parser_extracts_quoted_edges() {
        let dump = concat!(
            "digraph depends {\n",
            "\"busybox\" [label=\"busybox :1.36\"]\n",
            "\"busybox\" -> \"zlib\"\n",
            "\"curl\" -> \"openssl\" [style=dashed]\n",
            "}\n"
        );
        let edges = parse_dependency_dump(dump);
        assert_eq!(
            edges,
            vec![
                ("busybox".to_string(), "zlib".to_string()),
                ("curl".to_string(), "openssl".to_string()),
            ]
        );
    }

    #[test]
    fn dump_parser_ignores_non_edge_lines() {
        let dump = "digraph depends {\nlabel=\"deps\"\n}\n";
        assert!(parse_dependency_dump(dump).is_empty());
    }
}
