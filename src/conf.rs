/// Axiom core configuration
///
/// All configuration is persisted to ~/.axiom/core-conf.txt
/// Format: property=value (one per line, comments with #)
///
/// Properties are grouped by subsystem and documented extensively, following
/// the format the surrounding toolchain's own `conf` system uses — trimmed
/// here from that system's 22 VM/GC/bytecode subsystems down to the handful
/// of knobs the numeric tower, struct registry, and hash tables actually
/// read (SPEC_FULL.md §6).

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Configuration property definitions
// ---------------------------------------------------------------------------

/// A configuration property with full documentation.
#[derive(Debug, Clone)]
pub struct PropDef {
    pub name: &'static str,
    pub default: &'static str,
    pub description: &'static str,
    pub performance_impact: &'static str,
    pub memory_impact: &'static str,
    pub category: Category,
    pub production_recommended: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Category {
    Numeric,
    Struct,
    Hash,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Numeric => "Numeric",
            Category::Struct => "Struct",
            Category::Hash => "Hash",
        };
        write!(f, "{}", s)
    }
}

pub static ALL_PROPS: &[PropDef] = &[
    PropDef {
        name: "numeric.checked_overflow",
        default: "on",
        description: "Use checked arithmetic on the Fixnum fast path and \
                       promote to Bignum on overflow, rather than wrapping.",
        performance_impact: "negligible — checked_add/checked_mul compile to \
                              the same overflow-flag branch as a wrapping op",
        memory_impact: "none",
        category: Category::Numeric,
        production_recommended: "on",
    },
    PropDef {
        name: "struct.prefab_registry_capacity_hint",
        default: "64",
        description: "Initial capacity hint for the process-wide prefab-type \
                       interning table. Purely a pre-allocation hint; the \
                       registry grows unbounded regardless.",
        performance_impact: "fewer rehashes during startup when many prefab \
                              types are declared up front",
        memory_impact: "proportional to the hint, paid once at first use",
        category: Category::Struct,
        production_recommended: "64",
    },
    PropDef {
        name: "struct.default_inspector_depth_guard",
        default: "1024",
        description: "Maximum ancestor-chain walk length for an inspector \
                       control check before it is treated as a cycle and \
                       rejected, guarding against a misconstructed sibling \
                       chain.",
        performance_impact: "none on well-formed chains",
        memory_impact: "none",
        category: Category::Struct,
        production_recommended: "1024",
    },
    PropDef {
        name: "hash.equal_cache",
        default: "off",
        description: "Cache `equal-hash-code` results on struct instances \
                       keyed by their identity so repeated equal-hashing of \
                       the same struct in one hash table avoids recomputing \
                       the structural walk.",
        performance_impact: "speeds up equal-keyed tables with struct keys \
                              at the cost of one extra map lookup per miss",
        memory_impact: "one entry per distinct struct ever hashed",
        category: Category::Hash,
        production_recommended: "off",
    },
];

// ---------------------------------------------------------------------------
// AxConf — loaded/persisted property store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AxConf {
    values: HashMap<String, String>,
}

impl AxConf {
    /// Load configuration from the default config file path.
    /// Falls back to defaults if file not found.
    pub fn load() -> Self {
        let mut conf = AxConf { values: HashMap::new() };
        for prop in ALL_PROPS {
            conf.values.insert(prop.name.to_string(), prop.default.to_string());
        }

        if let Some(path) = Self::config_path() {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                for line in contents.lines() {
                    let line = line.trim();
                    if line.starts_with('#') || line.is_empty() {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        conf.values.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }
        conf
    }

    pub fn config_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".axiom").join("core-conf.txt"))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("on") | Some("true") | Some("yes") | Some("1"))
    }

    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        if !ALL_PROPS.iter().any(|p| p.name == key) {
            return Err(format!(
                "Unknown configuration property: '{}'\nRun `conf.list()` to see all properties.",
                key
            ));
        }
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }

    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path().ok_or("Cannot determine config path")?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| format!("Cannot create config dir: {}", e))?;
        }

        let mut out = String::new();
        out.push_str("# Axiom core configuration — ~/.axiom/core-conf.txt\n\n");

        let mut by_category: Vec<(&PropDef, &str)> = ALL_PROPS
            .iter()
            .map(|p| (p, self.values.get(p.name).map(|s| s.as_str()).unwrap_or(p.default)))
            .collect();
        by_category.sort_by_key(|(p, _)| format!("{}", p.category));

        let mut current_cat: Option<String> = None;
        for (prop, value) in &by_category {
            let cat = format!("{}", prop.category);
            if current_cat.as_ref().map(|s| s.as_str()) != Some(cat.as_str()) {
                out.push_str(&format!("\n# ── {} ─────────────────────────\n", cat));
                current_cat = Some(cat);
            }
            out.push_str(&format!("{}={}\n", prop.name, value));
        }

        std::fs::write(&path, &out).map_err(|e| format!("Cannot write config: {}", e))?;
        Ok(())
    }

    /// Reset all properties to defaults.
    pub fn reset() -> Result<(), String> {
        let path = Self::config_path().ok_or("Cannot determine config path")?;
        let mut out = String::new();
        out.push_str("# Axiom core configuration — reset to defaults\n\n");
        for prop in ALL_PROPS {
            out.push_str(&format!("{}={}\n", prop.name, prop.default));
        }
        std::fs::write(&path, &out).map_err(|e| format!("Cannot reset config: {}", e))?;
        Ok(())
    }

    /// List all properties with current values, one line each.
    pub fn list(&self) -> Vec<String> {
        let mut by_category: Vec<&PropDef> = ALL_PROPS.iter().collect();
        by_category.sort_by_key(|p| format!("{}", p.category));

        by_category
            .into_iter()
            .map(|prop| {
                let current = self.get(prop.name).unwrap_or(prop.default);
                let marker = if current == prop.default { " " } else { "*" };
                format!("{} {:<36} = {}", marker, prop.name, current)
            })
            .collect()
    }

    /// Full documentation for one property, rendered as lines.
    pub fn describe(&self, key: &str) -> Option<Vec<String>> {
        let prop = ALL_PROPS.iter().find(|p| p.name == key)?;
        let current = self.get(prop.name).unwrap_or(prop.default);
        Some(vec![
            format!("{}", prop.name),
            format!("  category:            {}", prop.category),
            format!("  current value:       {}", current),
            format!("  default value:       {}", prop.default),
            format!("  production default:  {}", prop.production_recommended),
            format!("  description:         {}", prop.description),
            format!("  performance impact:  {}", prop.performance_impact),
            format!("  memory impact:       {}", prop.memory_impact),
        ])
    }
}

impl Default for AxConf {
    fn default() -> Self {
        Self::load()
    }
}
