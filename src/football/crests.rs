//! Joins crest images onto standings and fixtures by team name.

use serde::Deserialize;
use serde_json::Value;

use crate::fetch::Payload;

/// One entry of a crest list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Crest {
  pub name: String,
  pub logo: String,
}

/// Read a crest list; entries without a string `name` and `logo` are skipped.
pub fn crests_from_payload(payload: &Payload) -> Vec<Crest> {
  payload
    .as_array()
    .map(|items| {
      items
        .iter()
        .filter_map(|item| Crest::deserialize(item).ok())
        .collect()
    })
    .unwrap_or_default()
}

/// Logo of the first crest whose name matches exactly, or `""`.
pub fn crest_for<'a>(team_name: &str, crests: &'a [Crest]) -> &'a str {
  crests
    .iter()
    .find(|crest| crest.name == team_name)
    .map(|crest| crest.logo.as_str())
    .unwrap_or("")
}

/// Set a `logo` on every team in `data[section]`.
///
/// Items with a `table` are standings groups (`table[].team`); anything else is
/// treated as a fixture (`homeTeam`, `awayTeam`). Missing pieces are skipped.
pub fn apply_crests(data: &mut Payload, section: &str, crests: &[Crest]) {
  let Some(items) = data.get_mut(section).and_then(Value::as_array_mut) else {
    return;
  };

  for item in items {
    if let Some(table) = item.get_mut("table").and_then(Value::as_array_mut) {
      for entry in table {
        set_logo(entry.get_mut("team"), crests);
      }
    } else {
      set_logo(item.get_mut("homeTeam"), crests);
      set_logo(item.get_mut("awayTeam"), crests);
    }
  }
}

fn set_logo(team: Option<&mut Value>, crests: &[Crest]) {
  let Some(Value::Object(team)) = team else {
    return;
  };
  let logo = team
    .get("name")
    .and_then(Value::as_str)
    .map(|name| crest_for(name, crests))
    .unwrap_or("");
  team.insert("logo".to_string(), Value::String(logo.to_string()));
}
