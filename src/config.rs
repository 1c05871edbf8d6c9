// Engine settings
// Persisted as TOML in the platform config directory

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::draw_context::Color;
use crate::error::DocumentError;
use crate::richtext::formatter::BreakMode;

const QUALIFIER: &str = "net.roblillack";
const ORGANIZATION: &str = "Richdoc";
const APPLICATION: &str = "richdoc";
const CONFIG_FILE_NAME: &str = "richdoc.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BreakModeSetting {
    #[default]
    Words,
    Anywhere,
}

impl From<BreakModeSetting> for BreakMode {
    fn from(value: BreakModeSetting) -> Self {
        match value {
            BreakModeSetting::Words => BreakMode::Words,
            BreakModeSetting::Anywhere => BreakMode::Anywhere,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionColor {
    pub id: i32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Commands kept for undo
    pub undo_depth: usize,
    pub tab_stop_width: i32,
    /// Minimum space above and below every paragraph
    pub paragraph_spacing: i32,
    /// Page height for page-break aware layout; 0 disables page breaks
    pub page_size: i32,
    pub default_family: String,
    pub default_point_size: i32,
    pub default_color: Color,
    pub link_color: Color,
    pub underline_links: bool,
    /// Convert leading tabs to spaces on input and back on output
    pub untabify: bool,
    pub break_mode: BreakModeSetting,
    /// Size of images whose markup gives no dimensions
    pub image_size: i32,
    /// Line height reported when a character cannot be found in the layout
    pub fallback_line_height: i32,
    /// Highlight color per selection id
    pub selection_colors: Vec<SelectionColor>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let selection_colors = vec![
            SelectionColor {
                id: 1,
                color: 0xFF9999FF,
            },
            SelectionColor {
                id: 2,
                color: 0x99FF99FF,
            },
            SelectionColor {
                id: 3,
                color: 0xFFFF66FF,
            },
        ];
        EngineConfig {
            undo_depth: 100,
            tab_stop_width: 80,
            paragraph_spacing: 0,
            page_size: 0,
            default_family: "helvetica".to_string(),
            default_point_size: 12,
            default_color: 0x000000FF,
            link_color: 0x0000EEFF,
            underline_links: true,
            untabify: false,
            break_mode: BreakModeSetting::Words,
            image_size: 32,
            fallback_line_height: 15,
            selection_colors,
        }
    }
}

impl EngineConfig {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let contents = fs::read_to_string(path).map_err(|err| DocumentError::io(path, err))?;
        toml::from_str(&contents).map_err(|source| DocumentError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Settings from the default location, or the defaults when the file is
    /// missing or broken
    pub fn load_or_default() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to load settings: {err}");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| DocumentError::io(parent, err))?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml).map_err(|err| DocumentError::io(path, err))
    }
}
