//! Serving-cell information parsed from the modem's `+CPSI:` report.
//!
//! Example line:
//! `+CPSI: LTE,Online,452-02,0x1817,156384564,155,...`
//! Token 2 is `MCC-MNC`, token 3 the TAC/LAC (usually hex), token 4 the cell
//! id. The parsed record feeds the cell-tower geolocation API when GPS has
//! no fix.

use serde::Serialize;

/// Serving-cell identity. `is_outdated` marks the record as stale so the
/// query → lookup pair is re-issued; a fresh boot starts stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellInfo {
    pub mcc: u32,
    pub mnc: u32,
    pub lac: u32,
    pub cid: u64,
    pub is_outdated: bool,
}

impl Default for CellInfo {
    fn default() -> Self {
        Self {
            mcc: 0,
            mnc: 0,
            lac: 0,
            cid: 0,
            is_outdated: true,
        }
    }
}

/// Request body for the cell-tower location API.
#[derive(Debug, Clone, Serialize)]
pub struct LocationRequest {
    pub token: String,
    pub radio: &'static str,
    pub mcc: u32,
    pub mnc: u32,
    pub cells: Vec<CellTower>,
    pub address: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellTower {
    pub lac: u32,
    pub cid: u64,
    pub psc: u8,
}

fn parse_u32_any_radix(token: &str) -> Option<u32> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

impl CellInfo {
    /// Parse a `+CPSI:` line. Returns `None` when the line is not a CPSI
    /// report or the identity fields are missing/zero.
    pub fn parse_cpsi_line(line: &str) -> Option<CellInfo> {
        let payload = line.split_once("+CPSI:")?.1.trim();

        let mut mcc = 0u32;
        let mut mnc = 0u32;
        let mut lac = 0u32;
        let mut cid = 0u64;

        for (index, token) in payload.split(',').map(str::trim).enumerate() {
            match index {
                2 => {
                    let (m, n) = token.split_once('-')?;
                    mcc = m.parse().ok()?;
                    mnc = n.parse().ok()?;
                }
                3 => lac = parse_u32_any_radix(token)?,
                4 => {
                    cid = token.parse().ok()?;
                    break;
                }
                _ => {}
            }
        }

        if mcc == 0 || lac == 0 || cid == 0 {
            return None;
        }
        Some(CellInfo {
            mcc,
            mnc,
            lac,
            cid,
            is_outdated: false,
        })
    }

    /// True when the record identifies a real cell.
    pub fn is_usable(&self) -> bool {
        self.mcc > 0 && self.lac > 0 && self.cid > 0
    }

    /// Build the location-API request body for this cell.
    pub fn location_request(&self, token: &str) -> LocationRequest {
        LocationRequest {
            token: token.to_string(),
            radio: "lte",
            mcc: self.mcc,
            mnc: self.mnc,
            cells: vec![CellTower {
                lac: self.lac,
                cid: self.cid,
                psc: 0,
            }],
            address: 1,
        }
    }
}
