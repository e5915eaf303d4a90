// Wi-Fi network configuration payload (the WIFI: string phone cameras understand)

use serde::{Deserialize, Serialize};

use crate::error::{CodeManagerError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WifiAuth {
    #[default]
    Wpa,
    Wep,
    NoPass,
}

impl WifiAuth {
    /// Value of the T: field
    pub fn as_str(&self) -> &'static str {
        match self {
            WifiAuth::Wpa => "WPA",
            WifiAuth::Wep => "WEP",
            WifiAuth::NoPass => "nopass",
        }
    }

    /// Accepts the labels users type: "WPA/WPA2", "wpa", "WEP", "none", "nopass".
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "wpa" | "wpa2" | "wpa/wpa2" | "wpa3" => Ok(WifiAuth::Wpa),
            "wep" => Ok(WifiAuth::Wep),
            "none" | "nopass" | "open" => Ok(WifiAuth::NoPass),
            other => Err(CodeManagerError::InvalidContent(format!(
                "Unknown Wi-Fi authentication type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
    pub auth: WifiAuth,
    pub hidden: bool,
}

/// Backslash-escape the characters with special meaning in the payload.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ';' | ',' | ':' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Build `WIFI:T:<auth>;S:<ssid>;P:<password>;H:true;;`.
/// The password is left out for open networks; H only appears for hidden ones.
pub fn format_payload(creds: &WifiCredentials) -> Result<String> {
    if creds.ssid.trim().is_empty() {
        return Err(CodeManagerError::InvalidContent(
            "Wi-Fi network name (SSID) cannot be empty".to_string(),
        ));
    }

    let mut payload = format!("WIFI:T:{};S:{};", creds.auth.as_str(), escape(&creds.ssid));
    if creds.auth != WifiAuth::NoPass {
        payload.push_str(&format!("P:{};", escape(&creds.password)));
    }
    if creds.hidden {
        payload.push_str("H:true;");
    }
    payload.push(';');
    Ok(payload)
}
