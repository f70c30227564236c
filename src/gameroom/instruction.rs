use crate::grid::Kind;
use crate::grid::Value;
use crate::grid::Widget;

/// What an instruction obliges somebody to act on: a named widget somewhere
/// in the match, or one of the special threats discharged by unanimous
/// defense rather than by a widget.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    Widget { name: String },
    Asteroid,
    BlackHole,
}

impl Directive {
    pub fn is_special(&self) -> bool {
        matches!(self, Directive::Asteroid | Directive::BlackHole)
    }
    pub fn widget_name(&self) -> Option<&str> {
        match self {
            Directive::Widget { name } => Some(name),
            _ => None,
        }
    }
}

/// An obligation issued to one slot: somebody must put `directive` into the
/// state described by `value` before the expiry timer fires. `text` is the
/// phrasing shown to the slot that received the instruction; it is stable for
/// a given widget state and objective.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub id: u64,
    pub source: u64,
    pub target: Option<u64>,
    pub directive: Directive,
    pub value: Option<Value>,
    pub text: String,
    pub special_action: bool,
}

impl Instruction {
    /// Instruction against a grid widget. `own` marks a widget on the
    /// source's own grid, which changes the phrasing only.
    pub fn for_widget(
        id: u64,
        source: u64,
        target: Option<u64>,
        own: bool,
        widget: &Widget,
        value: Option<Value>,
        special_action: bool,
    ) -> Self {
        let text = Self::phrase(widget, value.as_ref(), own, special_action);
        Self {
            id,
            source,
            target,
            directive: Directive::Widget {
                name: widget.name.clone(),
            },
            value,
            text,
            special_action,
        }
    }

    pub fn asteroid(id: u64, source: u64) -> Self {
        Self {
            id,
            source,
            target: None,
            directive: Directive::Asteroid,
            value: None,
            text: "Asteroid incoming! Everyone, brace to deflect it!".to_string(),
            special_action: false,
        }
    }

    pub fn black_hole(id: u64, source: u64) -> Self {
        Self {
            id,
            source,
            target: None,
            directive: Directive::BlackHole,
            value: None,
            text: "Black hole detected! Everyone, brace to escape it!".to_string(),
            special_action: false,
        }
    }

    fn phrase(widget: &Widget, value: Option<&Value>, own: bool, special_action: bool) -> String {
        let base = match (&widget.kind, value) {
            (Kind::Button, _) => format!("Press {}", widget.name),
            (Kind::Switch { .. }, Some(Value::Bool(true))) => format!("Engage {}", widget.name),
            (Kind::Switch { .. }, _) => format!("Disengage {}", widget.name),
            (Kind::CircularSlider { .. }, Some(Value::Int(v))) => {
                format!("Dial {} to {}", widget.name, v)
            }
            (Kind::Slider { .. }, Some(Value::Int(v)))
            | (Kind::ButtonsSlider { .. }, Some(Value::Int(v))) => {
                format!("Set {} to {}", widget.name, v)
            }
            (Kind::Actions { actions }, Some(Value::Text(v))) => {
                // recover the display casing of the chosen action
                let verb = actions
                    .iter()
                    .find(|a| a.to_lowercase() == *v)
                    .cloned()
                    .unwrap_or_else(|| v.clone());
                format!("{} {}", verb, widget.name)
            }
            _ => format!("Operate {}", widget.name),
        };
        if special_action {
            format!("Everyone: {}!", base)
        } else if own {
            format!("{} on your console", base)
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_phrasing_follows_objective() {
        let w = Widget::new("Gamma Lights", 0, 0, 1, 1, Kind::Switch { toggled: false });
        let i = Instruction::for_widget(1, 10, Some(20), false, &w, Some(Value::Bool(true)), false);
        assert_eq!(i.text, "Engage Gamma Lights");
        assert_eq!(i.directive.widget_name(), Some("Gamma Lights"));
        assert_eq!(i.value, Some(Value::Bool(true)));
    }

    #[test]
    fn own_widget_phrasing_is_marked() {
        let w = Widget::new(
            "Thrust",
            0,
            0,
            2,
            1,
            Kind::Slider {
                min: 0,
                max: 4,
                value: 0,
            },
        );
        let i = Instruction::for_widget(1, 10, Some(10), true, &w, Some(Value::Int(3)), false);
        assert_eq!(i.text, "Set Thrust to 3 on your console");
    }

    #[test]
    fn actions_phrasing_recovers_display_casing() {
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
        let i = Instruction::for_widget(
            1,
            10,
            Some(20),
            false,
            &w,
            Some(Value::Text("submit".into())),
            true,
        );
        assert_eq!(i.text, "Everyone: Submit Vote!");
        assert!(i.special_action);
    }

    #[test]
    fn specials_have_no_value() {
        let a = Instruction::asteroid(1, 10);
        let b = Instruction::black_hole(2, 10);
        assert!(a.directive.is_special() && b.directive.is_special());
        assert_eq!(a.value, None);
        assert_eq!(b.value, None);
        assert_eq!(a.target, None);
    }
}
