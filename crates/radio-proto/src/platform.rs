use std::path::PathBuf;

/// Default port of the relay's HTTP surface.
pub const RELAY_HTTP_PORT: u16 = 8990;
const RELAY_HOST: &str = "127.0.0.1";

pub fn relay_address() -> String {
    format!("{}:{}", RELAY_HOST, RELAY_HTTP_PORT)
}

pub fn relay_base_url() -> String {
    format!("http://{}", relay_address())
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/radio/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("radio")
    }
    #[cfg(windows)]
    {
        // Portable layout: a data/ directory beside the executable wins
        if let Some(dir) = beside_exe("data") {
            return dir;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("radio")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(cfg) = beside_exe("config.toml") {
            if let Some(parent) = cfg.parent() {
                return parent.to_path_buf();
            }
        }
    }

    // On macOS and Linux, always use ~/.config/radio/
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("radio")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("radio")
    }
}

/// Directory holding the per-region frequency directory files
/// (`<region>.json`).  Checks beside the executable first so packaged
/// builds can ship the files with the binary.
pub fn default_frequencies_dir() -> PathBuf {
    if let Some(dir) = beside_exe("frequencies") {
        return dir;
    }
    data_dir().join("frequencies")
}

fn beside_exe(name: &str) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let p = current_exe.parent()?.join(name);
    p.exists().then_some(p)
}
