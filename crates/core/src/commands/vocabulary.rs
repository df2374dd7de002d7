//! Controlled vocabularies resolved before template substitution.

pub const MAX_TIME_TICKS: u32 = 24_000;

pub fn time_ticks(value: &str) -> Option<u32> {
    let normalized = value.trim().to_ascii_lowercase();
    if let Ok(ticks) = normalized.parse::<u32>() {
        return (ticks <= MAX_TIME_TICKS).then_some(ticks);
    }
    match normalized.as_str() {
        "day" | "morning" | "sunrise" => Some(1000),
        "noon" | "midday" => Some(6000),
        "sunset" | "evening" | "dusk" => Some(12000),
        "night" | "dark" | "midnight" => Some(13000),
        _ => None,
    }
}

pub fn weather_token(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "clear" | "sunny" | "nice" | "sun" => Some("clear"),
        "rain" | "rainy" | "raining" => Some("rain"),
        "thunder" | "storm" | "stormy" | "thunderstorm" => Some("thunder"),
        _ => None,
    }
}

pub fn gamemode_token(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "creative" | "build" => Some("creative"),
        "survival" | "survive" => Some("survival"),
        "adventure" => Some("adventure"),
        "spectator" | "spec" => Some("spectator"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{gamemode_token, time_ticks, weather_token};

    #[test]
    fn time_words_and_ticks() {
        assert_eq!(time_ticks("Morning"), Some(1000));
        assert_eq!(time_ticks("noon"), Some(6000));
        assert_eq!(time_ticks("dusk"), Some(12000));
        assert_eq!(time_ticks("night"), Some(13000));
        assert_eq!(time_ticks("18000"), Some(18000));
        assert_eq!(time_ticks("99999"), None);
        assert_eq!(time_ticks("teatime"), None);
    }

    #[test]
    fn weather_and_mode_words_map_to_canonical_tokens() {
        assert_eq!(weather_token("storm"), Some("thunder"));
        assert_eq!(weather_token("sunny"), Some("clear"));
        assert_eq!(weather_token("snow"), None);
        assert_eq!(gamemode_token("build"), Some("creative"));
        assert_eq!(gamemode_token("spec"), Some("spectator"));
        assert_eq!(gamemode_token("hardcore"), None);
    }
}
