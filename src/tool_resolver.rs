//! # Tool Path Resolver
//!
//! Localizza i re-encoder esterni usati per PNG e JPEG.
//!
//! ## Strategia:
//! 1. `TOOLS_DIR`: directory esplicita con i binari (override)
//! 2. `PATH` di sistema, tramite `which`
//!
//! ## Esempio:
//! ```rust,ignore
//! let resolver = ToolPathResolver::new();
//! let oxipng = resolver.resolve_tool(OXIPNG);
//! println!("{}", resolver.get_tools_report());
//! ```

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lossless PNG optimizer
pub const OXIPNG: &str = "oxipng";
/// Lossless JPEG transcoder
pub const JPEGTRAN: &str = "jpegtran";

const ALL_TOOLS: [(&str, &str); 2] = [("PNG", OXIPNG), ("JPEG", JPEGTRAN)];

/// Finds external tools in an override directory or on the system `PATH`
#[derive(Debug, Clone, Default)]
pub struct ToolPathResolver {
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Resolver honouring the `TOOLS_DIR` environment variable
    pub fn new() -> Self {
        let tools_dir = env::var_os("TOOLS_DIR")
            .map(PathBuf::from)
            .filter(|dir| dir.is_dir());
        if let Some(dir) = &tools_dir {
            debug!("Using tools directory {}", dir.display());
        }
        Self { tools_dir }
    }

    /// Resolver looking only inside `dir`, then on `PATH`
    pub fn with_tools_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(dir.into()),
        }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(dir) = &self.tools_dir {
            if let Some(path) = Self::bundled(dir, tool_name) {
                debug!("Using bundled tool: {} -> {}", tool_name, path.display());
                return Some(path);
            }
        }

        match which::which(tool_name) {
            Ok(path) => {
                debug!("Using system tool: {} -> {}", tool_name, path.display());
                Some(path)
            }
            Err(_) => None,
        }
    }

    fn bundled(dir: &Path, tool_name: &str) -> Option<PathBuf> {
        let file_name = format!("{}{}", tool_name, env::consts::EXE_SUFFIX);
        let path = dir.join(file_name);
        path.is_file().then_some(path)
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Get a report of tool availability
    pub fn get_tools_report(&self) -> String {
        let mut report = String::from("Tool availability\n");
        match &self.tools_dir {
            Some(dir) => report.push_str(&format!("Tools directory: {}\n", dir.display())),
            None => report.push_str("Tools directory: none (system PATH only)\n"),
        }

        for (format, tool) in ALL_TOOLS {
            match self.resolve_tool(tool) {
                Some(path) => report.push_str(&format!("  {:<5} {} -> {}\n", format, tool, path.display())),
                None => report.push_str(&format!("  {:<5} {} (not found)\n", format, tool)),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bundled_tool_takes_precedence() {
        let dir = TempDir::new().unwrap();
        let name = format!("{}{}", OXIPNG, env::consts::EXE_SUFFIX);
        std::fs::write(dir.path().join(&name), b"").unwrap();

        let resolver = ToolPathResolver::with_tools_dir(dir.path());
        assert_eq!(resolver.resolve_tool(OXIPNG), Some(dir.path().join(name)));
    }

    #[test]
    fn test_unknown_tool_is_missing() {
        let dir = TempDir::new().unwrap();
        let resolver = ToolPathResolver::with_tools_dir(dir.path());
        assert!(!resolver.is_tool_available("definitely-not-a-real-tool-4242"));
    }

    #[test]
    fn test_report_lists_every_tool() {
        let dir = TempDir::new().unwrap();
        let report = ToolPathResolver::with_tools_dir(dir.path()).get_tools_report();
        assert!(report.contains(OXIPNG));
        assert!(report.contains(JPEGTRAN));
    }
}
