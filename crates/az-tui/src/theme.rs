//! Color themes for the board.

use ratatui::style::Color;

/// Theme name identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeName {
    #[default]
    Default,
    Dark,
    Light,
    Solarized,
}

impl ThemeName {
    /// Parse a theme name from the config string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            "solarized" => Some(Self::Solarized),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Dark => "Dark",
            Self::Light => "Light",
            Self::Solarized => "Solarized",
        }
    }
}

/// Color palette used by the views.
#[derive(Debug, Clone)]
pub struct Theme {
    pub name: ThemeName,
    /// Column titles and the focused column border
    pub header: Color,
    /// Hotkey hints in the footer
    pub hotkey: Color,
    pub text: Color,
    pub text_dim: Color,
    pub border_dim: Color,
    /// Cursor row highlight
    pub cursor_bg: Color,
    /// Selected rows in Select mode
    pub selected: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    /// Busy session indicator
    pub busy: Color,
    /// Waiting session indicator
    pub waiting: Color,
    /// Jump label badges
    pub jump_label: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::named(ThemeName::Default)
    }
}

impl Theme {
    /// Look a theme up by config name, falling back to the default palette.
    pub fn from_config(name: &str) -> Self {
        Self::named(ThemeName::parse(name).unwrap_or_default())
    }

    pub fn named(name: ThemeName) -> Self {
        match name {
            ThemeName::Default => Self {
                name,
                header: Color::Cyan,
                hotkey: Color::Yellow,
                text: Color::White,
                text_dim: Color::Gray,
                border_dim: Color::DarkGray,
                cursor_bg: Color::Rgb(45, 45, 60),
                selected: Color::Magenta,
                success: Color::Green,
                warning: Color::Yellow,
                error: Color::Red,
                busy: Color::Green,
                waiting: Color::Yellow,
                jump_label: Color::LightRed,
            },
            ThemeName::Dark => Self {
                name,
                header: Color::LightBlue,
                hotkey: Color::LightYellow,
                text: Color::White,
                text_dim: Color::DarkGray,
                border_dim: Color::Black,
                cursor_bg: Color::Rgb(30, 30, 40),
                selected: Color::LightMagenta,
                success: Color::LightGreen,
                warning: Color::LightYellow,
                error: Color::LightRed,
                busy: Color::LightGreen,
                waiting: Color::LightYellow,
                jump_label: Color::LightRed,
            },
            ThemeName::Light => Self {
                name,
                header: Color::Blue,
                hotkey: Color::Rgb(160, 100, 0),
                text: Color::Black,
                text_dim: Color::DarkGray,
                border_dim: Color::Gray,
                cursor_bg: Color::Rgb(220, 220, 235),
                selected: Color::Magenta,
                success: Color::Rgb(0, 120, 0),
                warning: Color::Rgb(160, 100, 0),
                error: Color::Rgb(180, 0, 0),
                busy: Color::Rgb(0, 120, 0),
                waiting: Color::Rgb(160, 100, 0),
                jump_label: Color::Red,
            },
            ThemeName::Solarized => Self {
                name,
                header: Color::Rgb(38, 139, 210),
                hotkey: Color::Rgb(181, 137, 0),
                text: Color::Rgb(131, 148, 150),
                text_dim: Color::Rgb(88, 110, 117),
                border_dim: Color::Rgb(7, 54, 66),
                cursor_bg: Color::Rgb(7, 54, 66),
                selected: Color::Rgb(211, 54, 130),
                success: Color::Rgb(133, 153, 0),
                warning: Color::Rgb(181, 137, 0),
                error: Color::Rgb(220, 50, 47),
                busy: Color::Rgb(133, 153, 0),
                waiting: Color::Rgb(181, 137, 0),
                jump_label: Color::Rgb(203, 75, 22),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_theme_names() {
        assert_eq!(ThemeName::parse("dark"), Some(ThemeName::Dark));
        assert_eq!(ThemeName::parse("SOLARIZED"), Some(ThemeName::Solarized));
        assert_eq!(ThemeName::parse("nope"), None);
    }

    #[test]
    fn test_from_config_falls_back() {
        assert_eq!(Theme::from_config("unknown").name, ThemeName::Default);
        assert_eq!(Theme::from_config("light").name, ThemeName::Light);
    }
}
