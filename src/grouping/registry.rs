use crate::grouping::{ClassRule, UNCLASSIFIED_CLASS};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(serde::Deserialize)]
struct RuleFile {
    class: Vec<ClassRule>,
}

/// Operation classes and their grouping thresholds, loaded from TOML
///
/// # Example Usage
/// ```no_run
/// use ktrace::grouping::GroupingRules;
///
/// let rules = GroupingRules::from_toml("grouping.toml")?;
/// let class = rules.classify("pwrite64").map(|c| c.name.as_str());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct GroupingRules {
    classes: Vec<ClassRule>,

    /// Fast lookup: syscall name → index into `classes`
    syscall_to_class: HashMap<String, usize>,
}

impl GroupingRules {
    /// Load class rules from a TOML file
    ///
    /// # Errors
    /// Returns error if the file can't be read, has invalid TOML syntax, maps a
    /// syscall to two classes, names an unknown `on_socket` class, or defines
    /// the reserved `other` class.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read grouping rules: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RuleFile =
            toml::from_str(content).context("Failed to parse TOML grouping rules")?;
        Self::from_classes(file.class)
    }

    /// Embedded default rule set
    pub fn default_rules() -> Result<Self> {
        const DEFAULT_TOML: &str = include_str!("../../grouping-default.toml");
        Self::from_toml_str(DEFAULT_TOML).context("Failed to parse embedded grouping-default.toml")
    }

    fn from_classes(classes: Vec<ClassRule>) -> Result<Self> {
        let mut syscall_to_class = HashMap::new();
        for (index, class) in classes.iter().enumerate() {
            if class.name == UNCLASSIFIED_CLASS {
                anyhow::bail!(
                    "Class name '{}' is reserved for unclassified syscalls",
                    UNCLASSIFIED_CLASS
                );
            }
            if classes[..index].iter().any(|c| c.name == class.name) {
                anyhow::bail!("Duplicate class name '{}'", class.name);
            }
            if !class.gap_ms.is_finite() || class.gap_ms < 0.0 {
                anyhow::bail!("Class '{}' has invalid gap_ms {}", class.name, class.gap_ms);
            }
            for syscall in &class.syscalls {
                if let Some(existing) = syscall_to_class.insert(syscall.clone(), index) {
                    anyhow::bail!(
                        "Duplicate syscall '{}' in classes '{}' and '{}'",
                        syscall,
                        classes[existing].name,
                        class.name
                    );
                }
            }
        }

        for class in &classes {
            if let Some(target) = &class.on_socket {
                if !classes.iter().any(|c| &c.name == target) {
                    anyhow::bail!(
                        "Class '{}' reclassifies sockets to unknown class '{}'",
                        class.name,
                        target
                    );
                }
            }
        }

        Ok(Self {
            classes,
            syscall_to_class,
        })
    }

    /// Class of a syscall, if any rule names it
    pub fn classify(&self, syscall: &str) -> Option<&ClassRule> {
        self.syscall_to_class
            .get(syscall)
            .map(|&index| &self.classes[index])
    }

    pub fn get_class(&self, name: &str) -> Option<&ClassRule> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn classes(&self) -> &[ClassRule] {
        &self.classes
    }
}
