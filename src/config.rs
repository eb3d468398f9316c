//! Deployment settings for a [`Server`](crate::server::Server).
//!
//! Capacities that size memory (connections, identity slots, output buffer) are const generics on
//! the server; everything here only changes behaviour.

/// A start/end marker pair delimiting inline script regions in tag-interleaved resources.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Markers {
    /// Opens a script region, e.g. `<?lua`
    pub open: &'static [u8],
    /// Closes a script region, e.g. `?>`
    pub close: &'static [u8],
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            open: b"<?lua",
            close: b"?>",
        }
    }
}

/// Server configuration.  Construct with `Config::default()` and adjust with the `with_*` methods.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Resource served for a request target of exactly `/`
    pub index: &'static str,
    /// Resource substituted (with a 404 status) when the requested one cannot be served
    pub not_found: &'static str,
    /// Extension of resources whose whole body is script source, without the leading `.`
    pub full_script_ext: &'static str,
    /// Extension of resources that mix literal bytes and marker-delimited script regions
    pub tag_script_ext: &'static str,
    /// Markers used by tag-interleaved resources
    pub markers: Markers,
    /// Resources longer than this many bytes are refused and answered with the not-found page
    pub max_resource_size: usize,
    /// Consecutive idle polls after which a connection is aborted
    pub max_idle_polls: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: "/index.lua",
            not_found: "/404.html",
            full_script_ext: "lua",
            tag_script_ext: "pht",
            markers: Markers::default(),
            max_resource_size: 300 * 1024,
            max_idle_polls: 20,
        }
    }
}

impl Config {
    /// Set the resource served for `/`
    pub fn with_index(mut self, index: &'static str) -> Self {
        self.index = index;
        self
    }

    /// Set the resource served when the requested one is missing
    pub fn with_not_found(mut self, not_found: &'static str) -> Self {
        self.not_found = not_found;
        self
    }

    /// Set the full-page script and tag-interleaved extensions (without the leading `.`)
    pub fn with_script_exts(mut self, full: &'static str, tagged: &'static str) -> Self {
        self.full_script_ext = full;
        self.tag_script_ext = tagged;
        self
    }

    /// Set the script region markers
    pub fn with_markers(mut self, open: &'static [u8], close: &'static [u8]) -> Self {
        self.markers = Markers { open, close };
        self
    }

    /// Set the largest resource that will be served
    pub fn with_max_resource_size(mut self, size: usize) -> Self {
        self.max_resource_size = size;
        self
    }

    /// Set the number of consecutive idle polls tolerated before a connection is aborted
    pub fn with_max_idle_polls(mut self, polls: u8) -> Self {
        self.max_idle_polls = polls;
        self
    }
}
