//! Editor settings lookup for the preferred package manager
//!
//! Reads `npm.packageManager` from the workspace `.vscode/settings.json`,
//! then from the user-level settings of Code, Code - Insiders and VSCodium.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::configs::jsonc::normalize_jsonc;
use crate::platform::Platform;

pub const DEFAULT_PACKAGE_MANAGER: &str = "npm";

const EDITOR_FLAVORS: &[&str] = &["Code", "Code - Insiders", "VSCodium"];

#[derive(Debug, Default, Deserialize)]
struct EditorSettings {
    #[serde(rename = "npm.packageManager")]
    npm_package_manager: Option<String>,
}

/// Resolve the package-manager executable for a task running in `cwd`.
///
/// `user_settings` is the ordered list of user-level settings files to try
/// after the workspace file; see [`user_settings_candidates`].
pub fn resolve_package_manager(cwd: &Path, user_settings: &[PathBuf], default: &str) -> String {
    let workspace_settings = cwd.join(".vscode").join("settings.json");

    std::iter::once(workspace_settings.as_path())
        .chain(user_settings.iter().map(PathBuf::as_path))
        .find_map(read_package_manager)
        .unwrap_or_else(|| {
            if default.is_empty() {
                DEFAULT_PACKAGE_MANAGER.to_string()
            } else {
                default.to_string()
            }
        })
}

/// User-level settings files for `platform`, most specific first.
pub fn user_settings_candidates(platform: Platform) -> Vec<PathBuf> {
    let mut roots = Vec::new();

    match platform {
        Platform::MacOs => {
            if let Some(home) = dirs::home_dir() {
                roots.push(home.join("Library").join("Application Support"));
            }
        }
        Platform::Linux => {
            if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
                roots.push(PathBuf::from(xdg));
            }
            if let Some(home) = dirs::home_dir() {
                roots.push(home.join(".config"));
            }
        }
        Platform::Windows => {
            if let Some(app_data) = std::env::var_os("APPDATA").filter(|v| !v.is_empty()) {
                roots.push(PathBuf::from(app_data));
            }
        }
        Platform::Other => {
            if let Some(home) = dirs::home_dir() {
                return vec![home
                    .join(".config")
                    .join("Code")
                    .join("User")
                    .join("settings.json")];
            }
        }
    }

    roots
        .iter()
        .flat_map(|root| {
            EDITOR_FLAVORS
                .iter()
                .map(move |flavor| root.join(flavor).join("User").join("settings.json"))
        })
        .collect()
}

fn read_package_manager(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let settings: EditorSettings = serde_json::from_str(&normalize_jsonc(&content)).ok()?;
    normalize_package_manager(settings.npm_package_manager.as_deref()?)
}

fn normalize_package_manager(value: &str) -> Option<String> {
    match value.trim().to_lowercase().as_str() {
        name @ ("npm" | "yarn" | "pnpm" | "bun") => Some(name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_settings(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_workspace_settings_win_over_user_settings() {
        let workspace = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        let user_file = user.path().join("Code/User/settings.json");

        write_settings(
            &workspace.path().join(".vscode/settings.json"),
            "{\n // comment\n \"npm.packageManager\": \" PNPM \",\n}",
        );
        write_settings(&user_file, r#"{ "npm.packageManager": "yarn" }"#);

        let pm = resolve_package_manager(workspace.path(), &[user_file.clone()], "npm");
        assert_eq!(pm, "pnpm");

        let no_workspace = tempfile::tempdir().unwrap();
        let pm = resolve_package_manager(no_workspace.path(), &[user_file], "npm");
        assert_eq!(pm, "yarn");
    }

    #[test]
    fn test_invalid_or_missing_values_fall_back_to_default() {
        let workspace = tempfile::tempdir().unwrap();
        write_settings(
            &workspace.path().join(".vscode/settings.json"),
            r#"{ "npm.packageManager": "cargo" }"#,
        );

        assert_eq!(resolve_package_manager(workspace.path(), &[], "npm"), "npm");
        assert_eq!(resolve_package_manager(workspace.path(), &[], ""), "npm");
        assert_eq!(resolve_package_manager(workspace.path(), &[], "bun"), "bun");
    }

    #[test]
    fn test_user_settings_candidates_cover_editor_flavors() {
        let candidates = user_settings_candidates(Platform::Linux);
        assert!(candidates.len() % EDITOR_FLAVORS.len() == 0);
        assert!(candidates
            .iter()
            .all(|p| p.ends_with(Path::new("User").join("settings.json"))));
    }
}
