//! Terminal capability detection
//!
//! snapdelta mostly runs inside build agents, so styled output and prompts
//! are only used when both ends of the terminal are attached and no CI
//! marker is present.

use std::io::IsTerminal;

/// Environment variables set by common build servers
const CI_MARKERS: &[&str] = &[
    "CI",
    "BUILD_NUMBER",
    "JENKINS_URL",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "TEAMCITY_VERSION",
    "TF_BUILD",
    "BUILDKITE",
];

/// How the current process may talk to the user
#[derive(Debug, Clone)]
pub struct UiContext {
    /// stdout is a terminal and colors are allowed
    styled: bool,
    /// stdin is a terminal and no build server is driving us
    prompts: bool,
    auto_yes: bool,
}

impl UiContext {
    /// Inspect the terminal and environment
    pub fn detect() -> Self {
        let on_build_server = CI_MARKERS.iter().any(|var| std::env::var_os(var).is_some());
        let styled = std::io::stdout().is_terminal()
            && std::env::var_os("NO_COLOR").is_none()
            && !on_build_server;
        Self {
            styled,
            prompts: styled && std::io::stdin().is_terminal(),
            auto_yes: false,
        }
    }

    /// Plain output, no prompts
    pub fn non_interactive() -> Self {
        Self {
            styled: false,
            prompts: false,
            auto_yes: false,
        }
    }

    /// Answer yes to every confirmation
    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.prompts
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    pub fn use_fancy_output(&self) -> bool {
        self.styled
    }
}
