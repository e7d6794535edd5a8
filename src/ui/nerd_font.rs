/// Icons used in spaller output.
///
/// A curated subset of nerd font glyphs. [`NerdFont::ascii`] is the plain
/// fallback used when color output is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NerdFont {
    Check,
    Cross,
    Warning,
    Info,
    Download,
    Package,
    Gear,
    Globe,
    Folder,
    Stop,
}

impl NerdFont {
    /// Get the Unicode character for this nerd font icon
    pub const fn unicode(&self) -> char {
        match self {
            Self::Check => '\u{f00c}',    // fa-check
            Self::Cross => '\u{f00d}',    // fa-times
            Self::Warning => '\u{f071}',  // fa-exclamation-triangle
            Self::Info => '\u{f05a}',     // fa-info-circle
            Self::Download => '\u{f019}', // fa-download
            Self::Package => '\u{f187}',  // fa-archive
            Self::Gear => '\u{f013}',     // fa-gear
            Self::Globe => '\u{f0ac}',    // fa-globe
            Self::Folder => '\u{f07b}',   // fa-folder
            Self::Stop => '\u{f04d}',     // fa-stop
        }
    }

    /// Plain fallback for terminals without nerd fonts.
    pub const fn ascii(&self) -> &'static str {
        match self {
            Self::Check => "[ok]",
            Self::Cross => "[x]",
            Self::Warning => "[!]",
            Self::Info => "[i]",
            Self::Download => "[v]",
            Self::Package => "[#]",
            Self::Gear => "[*]",
            Self::Globe => "[@]",
            Self::Folder => "[/]",
            Self::Stop => "[-]",
        }
    }
}

impl std::fmt::Display for NerdFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unicode())
    }
}

impl From<NerdFont> for char {
    fn from(icon: NerdFont) -> Self {
        icon.unicode()
    }
}
