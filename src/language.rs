use std::fmt;

use serde::{Deserialize, Serialize};

/// Every language the harness knows about
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rhai,
    Python,
    JavaScript,
    Java,
    Cpp,
}

/// How a language's submissions are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Embedded interpreter inside this process
    InProcess,
    /// External interpreter driven through a generated harness file
    Subprocess,
    /// Toolchain is probed but execution is not implemented
    Pending,
}

/// External interpreter or compiler a language depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toolchain {
    pub name: &'static str,
    pub binary: &'static str,
    pub version_arg: &'static str,
    pub hint: &'static str,
}

const ALIASES: &[(&str, Language)] = &[
    ("rhai", Language::Rhai),
    ("script", Language::Rhai),
    ("python", Language::Python),
    ("python3", Language::Python),
    ("py", Language::Python),
    ("javascript", Language::JavaScript),
    ("js", Language::JavaScript),
    ("node", Language::JavaScript),
    ("nodejs", Language::JavaScript),
    ("java", Language::Java),
    ("cpp", Language::Cpp),
    ("c++", Language::Cpp),
    ("cxx", Language::Cpp),
    ("g++", Language::Cpp),
];

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Rhai,
        Language::Python,
        Language::JavaScript,
        Language::Java,
        Language::Cpp,
    ];

    /// Resolves a caller-supplied token, case-insensitively, through the alias table
    pub fn resolve(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == token)
            .map(|(_, language)| *language)
    }

    /// Canonical identifier, as used on the wire
    pub fn id(self) -> &'static str {
        match self {
            Self::Rhai => "rhai",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Java => "java",
            Self::Cpp => "cpp",
        }
    }

    pub fn aliases(self) -> Vec<&'static str> {
        ALIASES
            .iter()
            .filter(|(_, language)| *language == self)
            .map(|(alias, _)| *alias)
            .collect()
    }

    pub fn backend(self) -> Backend {
        match self {
            Self::Rhai => Backend::InProcess,
            Self::Python | Self::JavaScript => Backend::Subprocess,
            Self::Java | Self::Cpp => Backend::Pending,
        }
    }

    pub fn toolchain(self) -> Option<Toolchain> {
        match self {
            Self::Rhai => None,
            Self::Python => Some(Toolchain {
                name: "Python 3",
                binary: "python3",
                version_arg: "--version",
                hint: "Install it from https://www.python.org/downloads/",
            }),
            Self::JavaScript => Some(Toolchain {
                name: "Node.js",
                binary: "node",
                version_arg: "--version",
                hint: "Install it from https://nodejs.org/",
            }),
            Self::Java => Some(Toolchain {
                name: "JDK",
                binary: "javac",
                version_arg: "-version",
                hint: "Install it from https://www.oracle.com/java/technologies/downloads/",
            }),
            Self::Cpp => Some(Toolchain {
                name: "g++",
                binary: "g++",
                version_arg: "--version",
                hint: "Install MinGW (Windows) or build-essential (Linux)",
            }),
        }
    }

    /// Comma separated canonical identifiers, for error messages
    pub fn supported_list() -> String {
        Self::ALL.map(Self::id).join(", ")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rhai => "Rhai",
            Self::Python => "Python",
            Self::JavaScript => "JavaScript",
            Self::Java => "Java",
            Self::Cpp => "C++",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(Language::resolve("js"), Some(Language::JavaScript));
        assert_eq!(Language::resolve("  Python "), Some(Language::Python));
        assert_eq!(Language::resolve("C++"), Some(Language::Cpp));
        assert_eq!(Language::resolve("RHAI"), Some(Language::Rhai));
        assert_eq!(Language::resolve("cobol"), None);
        assert_eq!(Language::resolve(""), None);
    }

    #[test]
    fn test_every_language_has_its_id_as_alias() {
        for language in Language::ALL {
            assert_eq!(Language::resolve(language.id()), Some(language));
            assert!(language.aliases().contains(&language.id()));
        }
    }

    #[test]
    fn test_backends() {
        assert_eq!(Language::Rhai.backend(), Backend::InProcess);
        assert!(Language::Rhai.toolchain().is_none());
        assert_eq!(Language::JavaScript.backend(), Backend::Subprocess);
        assert_eq!(Language::Java.backend(), Backend::Pending);
        assert_eq!(Language::Cpp.toolchain().unwrap().binary, "g++");
    }

    #[test]
    fn test_supported_list() {
        assert_eq!(
            Language::supported_list(),
            "rhai, python, javascript, java, cpp"
        );
    }
}
