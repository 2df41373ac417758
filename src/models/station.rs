//! 支持的地铁站与主题

use phf::phf_map;
use serde::{Deserialize, Serialize};

/// 站点主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationTheme {
    /// 미스터리
    Mystery,
    /// 공포
    Horror,
    /// 로맨스
    Romance,
    /// 모험
    Adventure,
    /// 코미디
    Comedy,
    /// 스릴러
    Thriller,
}

impl StationTheme {
    pub const ALL: [StationTheme; 6] = [
        StationTheme::Mystery,
        StationTheme::Horror,
        StationTheme::Romance,
        StationTheme::Adventure,
        StationTheme::Comedy,
        StationTheme::Thriller,
    ];

    /// 游戏内显示名称
    pub fn label(self) -> &'static str {
        match self {
            StationTheme::Mystery => "미스터리",
            StationTheme::Horror => "공포",
            StationTheme::Romance => "로맨스",
            StationTheme::Adventure => "모험",
            StationTheme::Comedy => "코미디",
            StationTheme::Thriller => "스릴러",
        }
    }

    /// 主题对应的默认难度
    pub fn difficulty(self) -> Difficulty {
        match self {
            StationTheme::Horror | StationTheme::Thriller => Difficulty::Hard,
            StationTheme::Mystery | StationTheme::Adventure => Difficulty::Normal,
            StationTheme::Romance | StationTheme::Comedy => Difficulty::Easy,
        }
    }
}

/// 故事难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "쉬움",
            Difficulty::Normal => "보통",
            Difficulty::Hard => "어려움",
        }
    }
}

/// 站点配置
#[derive(Debug, Clone, Copy)]
pub struct StationInfo {
    pub line: u8,
    pub theme: StationTheme,
}

/// 核心站点表
pub static STATIONS: phf::Map<&'static str, StationInfo> = phf_map! {
    "종각" => StationInfo { line: 1, theme: StationTheme::Mystery },
    "시청" => StationInfo { line: 1, theme: StationTheme::Thriller },
    "서울역" => StationInfo { line: 1, theme: StationTheme::Adventure },
    "강남" => StationInfo { line: 2, theme: StationTheme::Romance },
    "홍대입구" => StationInfo { line: 2, theme: StationTheme::Comedy },
    "잠실" => StationInfo { line: 2, theme: StationTheme::Adventure },
    "압구정" => StationInfo { line: 3, theme: StationTheme::Romance },
    "교대" => StationInfo { line: 3, theme: StationTheme::Mystery },
    "옥수" => StationInfo { line: 3, theme: StationTheme::Mystery },
    "명동" => StationInfo { line: 4, theme: StationTheme::Adventure },
    "혜화" => StationInfo { line: 4, theme: StationTheme::Romance },
    "사당" => StationInfo { line: 4, theme: StationTheme::Horror },
};

/// 站名查找，兼容带“역”后缀的写法
pub fn lookup(station_name: &str) -> Option<StationInfo> {
    let name = station_name.trim();
    STATIONS
        .get(name)
        .or_else(|| name.strip_suffix('역').and_then(|n| STATIONS.get(n)))
        .copied()
}

/// 收录站点的标准名称（去掉“역”后缀）
pub fn canonical_name(station_name: &str) -> Option<&'static str> {
    let name = station_name.trim();
    STATIONS
        .get_entry(name)
        .or_else(|| name.strip_suffix('역').and_then(|n| STATIONS.get_entry(n)))
        .map(|(key, _)| *key)
}

/// 站点主题；未收录的站点按名称稳定地映射到一个主题
pub fn theme_for(station_name: &str) -> StationTheme {
    lookup(station_name)
        .map(|info| info.theme)
        .unwrap_or_else(|| StationTheme::ALL[stable_index(station_name, StationTheme::ALL.len())])
}

/// 基于字符串内容的稳定下标（FNV-1a），保证同一输入总是得到同一结果
pub fn stable_index(seed: &str, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in seed.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % len as u64) as usize
}

/// `/stations` 返回的单个站点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportedStation {
    pub station_name: String,
    pub line_number: u8,
    pub theme: String,
    pub difficulty: String,
}

/// 所有支持的站点（按线路、站名排序）
pub fn supported_stations() -> Vec<SupportedStation> {
    let mut stations: Vec<SupportedStation> = STATIONS
        .entries()
        .map(|(name, info)| SupportedStation {
            station_name: (*name).to_string(),
            line_number: info.line,
            theme: info.theme.label().to_string(),
            difficulty: info.theme.difficulty().label().to_string(),
        })
        .collect();
    stations.sort_by(|a, b| {
        a.line_number
            .cmp(&b.line_number)
            .then_with(|| a.station_name.cmp(&b.station_name))
    });
    stations
}

/// 站点表覆盖的线路
pub fn supported_lines() -> Vec<u8> {
    let mut lines: Vec<u8> = STATIONS.values().map(|info| info.line).collect();
    lines.sort_unstable();
    lines.dedup();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_with_and_without_suffix() {
        assert_eq!(lookup("강남").map(|s| s.line), Some(2));
        assert_eq!(lookup("강남역").map(|s| s.line), Some(2));
        assert_eq!(lookup("사당").map(|s| s.theme), Some(StationTheme::Horror));
        assert!(lookup("부산").is_none());
        assert_eq!(canonical_name("강남역"), Some("강남"));
        assert_eq!(canonical_name("부산"), None);
    }

    #[test]
    fn test_unknown_station_theme_is_stable() {
        assert_eq!(theme_for("부산"), theme_for("부산"));
        assert_eq!(theme_for("시청"), StationTheme::Thriller);
    }

    #[test]
    fn test_supported_stations_sorted() {
        let stations = supported_stations();
        assert_eq!(stations.len(), 12);
        assert!(stations
            .windows(2)
            .all(|w| w[0].line_number <= w[1].line_number));
        assert_eq!(supported_lines(), vec![1, 2, 3, 4]);
    }
}
