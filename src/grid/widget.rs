use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

/// A value submitted against a widget, or required by an instruction.
/// Untagged so `true`, `3` and `"submit"` deserialize straight from the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Variant-specific widget state.
#[derive(Clone, Debug, PartialEq)]
pub enum Kind {
    Button,
    Switch { toggled: bool },
    Slider { min: i64, max: i64, value: i64 },
    CircularSlider { min: i64, max: i64, value: i64 },
    ButtonsSlider { min: i64, max: i64, value: i64 },
    Actions { actions: Vec<String> },
}

impl Kind {
    /// Wire tag for the `type` field.
    pub fn tag(&self) -> &'static str {
        match self {
            Kind::Button => "button",
            Kind::Switch { .. } => "switch",
            Kind::Slider { .. } => "slider",
            Kind::CircularSlider { .. } => "circular_slider",
            Kind::ButtonsSlider { .. } => "buttons_slider",
            Kind::Actions { .. } => "actions",
        }
    }
    pub fn is_slider_like(&self) -> bool {
        matches!(
            self,
            Kind::Slider { .. } | Kind::CircularSlider { .. } | Kind::ButtonsSlider { .. }
        )
    }
}

/// An interactive element on a player's grid.
///
/// `name` is unique across the whole match. `extra` carries arbitrary
/// key-value pairs that are merged into the wire format after the core keys.
#[derive(Clone, Debug, PartialEq)]
pub struct Widget {
    pub name: String,
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
    pub kind: Kind,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Widget {
    pub fn new(name: impl Into<String>, x: usize, y: usize, w: usize, h: usize, kind: Kind) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            w,
            h,
            kind,
            extra: serde_json::Map::new(),
        }
    }

    /// Wire format: `{x, y, w, h, name, type, ...variant, ...extra}`,
    /// extras last so they win over core keys.
    pub fn payload(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("x".into(), self.x.into());
        map.insert("y".into(), self.y.into());
        map.insert("w".into(), self.w.into());
        map.insert("h".into(), self.h.into());
        map.insert("name".into(), self.name.clone().into());
        map.insert("type".into(), self.kind.tag().into());
        match &self.kind {
            Kind::Slider { min, max, .. }
            | Kind::CircularSlider { min, max, .. }
            | Kind::ButtonsSlider { min, max, .. } => {
                map.insert("min".into(), (*min).into());
                map.insert("max".into(), (*max).into());
            }
            Kind::Actions { actions } => {
                map.insert("actions".into(), serde_json::json!(actions));
            }
            Kind::Switch { toggled } => {
                map.insert("toggled".into(), (*toggled).into());
            }
            Kind::Button => {}
        }
        for (k, v) in &self.extra {
            map.insert(k.clone(), v.clone());
        }
        serde_json::Value::Object(map)
    }

    /// Checks a submitted value against the variant's contract. Action names
    /// are matched case-insensitively.
    pub fn validate(&self, value: Option<&Value>) -> anyhow::Result<()> {
        match (&self.kind, value) {
            (Kind::Button, None) => Ok(()),
            (Kind::Button, Some(_)) => Err(anyhow::anyhow!("invalid value, must be absent")),
            (Kind::Switch { .. }, Some(Value::Bool(_))) => Ok(()),
            (Kind::Switch { .. }, _) => Err(anyhow::anyhow!("invalid value, must be a bool")),
            (Kind::Slider { min, max, .. }, Some(Value::Int(v)))
            | (Kind::CircularSlider { min, max, .. }, Some(Value::Int(v)))
            | (Kind::ButtonsSlider { min, max, .. }, Some(Value::Int(v))) => {
                if min <= v && v <= max {
                    Ok(())
                } else {
                    Err(anyhow::anyhow!(
                        "invalid value, must be an int between {} and {}",
                        min,
                        max
                    ))
                }
            }
            (Kind::Slider { .. }, _)
            | (Kind::CircularSlider { .. }, _)
            | (Kind::ButtonsSlider { .. }, _) => {
                Err(anyhow::anyhow!("invalid value, must be an int"))
            }
            (Kind::Actions { actions }, Some(Value::Text(v))) => {
                let v = v.to_lowercase();
                if actions.iter().any(|a| a.to_lowercase() == v) {
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("invalid value, must be a valid action"))
                }
            }
            (Kind::Actions { .. }, _) => Err(anyhow::anyhow!("invalid value, must be a string")),
        }
    }

    /// Applies a validated value: sliders store it, switches toggle to it.
    /// Buttons and action menus hold no state.
    pub fn apply(&mut self, value: Option<&Value>) {
        match (&mut self.kind, value) {
            (Kind::Slider { value: v, .. }, Some(Value::Int(n)))
            | (Kind::CircularSlider { value: v, .. }, Some(Value::Int(n)))
            | (Kind::ButtonsSlider { value: v, .. }, Some(Value::Int(n))) => *v = *n,
            (Kind::Switch { toggled }, Some(Value::Bool(b))) => *toggled = *b,
            _ => {}
        }
    }

    /// The value an instruction against this widget must observe: buttons
    /// need none, switches the opposite of their current position, sliders a
    /// random reachable value other than the current one, action menus one of
    /// their verbs (lower-cased, as clients submit them).
    pub fn objective<R: Rng>(&self, rng: &mut R) -> Option<Value> {
        match &self.kind {
            Kind::Button => None,
            Kind::Switch { toggled } => Some(Value::Bool(!toggled)),
            Kind::Slider { min, max, value }
            | Kind::CircularSlider { min, max, value }
            | Kind::ButtonsSlider { min, max, value } => {
                if min == max {
                    return Some(Value::Int(*max));
                }
                loop {
                    let v = rng.random_range(*min..=*max);
                    if v != *value {
                        return Some(Value::Int(v));
                    }
                }
            }
            Kind::Actions { actions } => actions
                .get(rng.random_range(0..actions.len()))
                .map(|a| Value::Text(a.to_lowercase())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn slider() -> Widget {
        Widget::new(
            "thrust",
            0,
            0,
            2,
            1,
            Kind::Slider {
                min: 0,
                max: 4,
                value: 0,
            },
        )
    }

    #[test]
    fn button_rejects_any_value() {
        let w = Widget::new("ping", 0, 0, 1, 1, Kind::Button);
        assert!(w.validate(None).is_ok());
        assert!(w.validate(Some(&Value::Bool(true))).is_err());
    }
    #[test]
    fn switch_requires_bool() {
        let w = Widget::new("lights", 0, 0, 1, 1, Kind::Switch { toggled: false });
        assert!(w.validate(Some(&Value::Bool(true))).is_ok());
        assert!(w.validate(Some(&Value::Int(1))).is_err());
        assert!(w.validate(None).is_err());
    }
    #[test]
    fn slider_bounds_value() {
        let w = slider();
        assert!(w.validate(Some(&Value::Int(0))).is_ok());
        assert!(w.validate(Some(&Value::Int(4))).is_ok());
        assert!(w.validate(Some(&Value::Int(5))).is_err());
        assert!(w.validate(Some(&Value::Text("4".into()))).is_err());
    }
    #[test]
    fn actions_match_case_insensitively() {
        let w = Widget::new(
            "Vote",
            0,
            0,
            1,
            2,
            Kind::Actions {
                actions: vec!["Submit".into()],
            },
        );
        assert!(w.validate(Some(&Value::Text("submit".into()))).is_ok());
        assert!(w.validate(Some(&Value::Text("Submit".into()))).is_ok());
        assert!(w.validate(Some(&Value::Text("eat".into()))).is_err());
    }
    #[test]
    fn apply_moves_slider_and_switch() {
        let mut s = slider();
        s.apply(Some(&Value::Int(3)));
        assert!(matches!(s.kind, Kind::Slider { value: 3, .. }));
        let mut w = Widget::new("lights", 0, 0, 1, 1, Kind::Switch { toggled: false });
        w.apply(Some(&Value::Bool(true)));
        assert!(matches!(w.kind, Kind::Switch { toggled: true }));
    }
    #[test]
    fn objective_avoids_current_slider_value() {
        let mut rng = SmallRng::seed_from_u64(7);
        let w = slider();
        for _ in 0..32 {
            match w.objective(&mut rng) {
                Some(Value::Int(v)) => assert!((1..=4).contains(&v)),
                other => panic!("unexpected objective {:?}", other),
            }
        }
    }
    #[test]
    fn objective_flips_switch() {
        let mut rng = SmallRng::seed_from_u64(7);
        let w = Widget::new("lights", 0, 0, 1, 1, Kind::Switch { toggled: false });
        assert_eq!(w.objective(&mut rng), Some(Value::Bool(true)));
    }
    #[test]
    fn payload_merges_extras_last() {
        let mut w = slider();
        w.extra.insert("hint".into(), serde_json::json!("hold"));
        w.extra.insert("type".into(), serde_json::json!("override"));
        let p = w.payload();
        assert_eq!(p["name"], "thrust");
        assert_eq!(p["min"], 0);
        assert_eq!(p["max"], 4);
        assert_eq!(p["hint"], "hold");
        assert_eq!(p["type"], "override");
    }
    #[test]
    fn value_deserializes_untagged() {
        assert_eq!(
            serde_json::from_str::<Value>("true").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(serde_json::from_str::<Value>("3").unwrap(), Value::Int(3));
        assert_eq!(
            serde_json::from_str::<Value>("\"submit\"").unwrap(),
            Value::Text("submit".into())
        );
    }
}
