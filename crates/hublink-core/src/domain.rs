// ── Per-domain command strategy ──
//
// One table decides what a domain can do and how a toggle maps onto a
// service call. Callers look up a `DomainStrategy` from a parsed `Domain`
// instead of branching on the id prefix.

use crate::model::Domain;

/// Control surfaces a domain exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    TurnOnOff,
    SetValue,
    SelectOption,
    Press,
    MediaTransport,
}

/// Two-state toggle: which service leads to which state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryStates {
    pub on: &'static str,
    pub off: &'static str,
    pub on_service: &'static str,
    pub off_service: &'static str,
}

const ON_OFF: BinaryStates = BinaryStates {
    on: "on",
    off: "off",
    on_service: "turn_on",
    off_service: "turn_off",
};

const OPEN_CLOSED: BinaryStates = BinaryStates {
    on: "open",
    off: "closed",
    on_service: "open_cover",
    off_service: "close_cover",
};

const LOCKED_UNLOCKED: BinaryStates = BinaryStates {
    on: "locked",
    off: "unlocked",
    on_service: "lock",
    off_service: "unlock",
};

/// States treated as "powered down" by [`ToggleKind::Power`].
const POWERED_DOWN: &[&str] = &["off", "standby", "unavailable"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    /// Flip between two known states; the target is predictable.
    Binary(BinaryStates),
    /// `turn_on` when powered down, `turn_off` otherwise. The resulting
    /// state is whatever the device settles on, so no target is known.
    Power,
    /// Fire a one-shot service with no resulting state.
    Activate(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainStrategy {
    pub capabilities: &'static [Capability],
    pub toggle: Option<ToggleKind>,
    /// Whether commands get a local overlay before the hub confirms.
    pub optimistic: bool,
}

/// The service call a toggle resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TogglePlan {
    pub service: &'static str,
    /// `Some` when the resulting state is known in advance.
    pub target_state: Option<&'static str>,
}

impl DomainStrategy {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Work out the toggle for an entity currently in `current`.
    pub fn toggle_plan(&self, current: &str) -> Option<TogglePlan> {
        match self.toggle? {
            ToggleKind::Binary(states) => Some(if current == states.on {
                TogglePlan {
                    service: states.off_service,
                    target_state: Some(states.off),
                }
            } else {
                TogglePlan {
                    service: states.on_service,
                    target_state: Some(states.on),
                }
            }),
            ToggleKind::Power => Some(TogglePlan {
                service: if POWERED_DOWN.contains(&current) {
                    "turn_on"
                } else {
                    "turn_off"
                },
                target_state: None,
            }),
            ToggleKind::Activate(service) => Some(TogglePlan {
                service,
                target_state: None,
            }),
        }
    }
}

pub fn strategy_for(domain: &Domain) -> DomainStrategy {
    use Capability as C;

    match domain {
        Domain::Light | Domain::Switch | Domain::Fan | Domain::InputBoolean | Domain::Other(_) => {
            DomainStrategy {
                capabilities: &[C::TurnOnOff],
                toggle: Some(ToggleKind::Binary(ON_OFF)),
                optimistic: true,
            }
        }
        Domain::Cover => DomainStrategy {
            capabilities: &[C::TurnOnOff],
            toggle: Some(ToggleKind::Binary(OPEN_CLOSED)),
            optimistic: true,
        },
        Domain::Lock => DomainStrategy {
            capabilities: &[C::TurnOnOff],
            toggle: Some(ToggleKind::Binary(LOCKED_UNLOCKED)),
            optimistic: true,
        },
        Domain::Climate => DomainStrategy {
            capabilities: &[C::TurnOnOff, C::SetValue],
            toggle: Some(ToggleKind::Power),
            optimistic: true,
        },
        Domain::MediaPlayer => DomainStrategy {
            capabilities: &[C::TurnOnOff, C::MediaTransport],
            toggle: Some(ToggleKind::Power),
            optimistic: false,
        },
        Domain::Scene | Domain::Script => DomainStrategy {
            capabilities: &[C::TurnOnOff],
            toggle: Some(ToggleKind::Activate("turn_on")),
            optimistic: false,
        },
        Domain::Button | Domain::InputButton => DomainStrategy {
            capabilities: &[C::Press],
            toggle: Some(ToggleKind::Activate("press")),
            optimistic: false,
        },
        Domain::Number | Domain::InputNumber => DomainStrategy {
            capabilities: &[C::SetValue],
            toggle: None,
            optimistic: false,
        },
        Domain::Select | Domain::InputSelect => DomainStrategy {
            capabilities: &[C::SelectOption],
            toggle: None,
            optimistic: true,
        },
        Domain::Sensor | Domain::BinarySensor | Domain::Camera => DomainStrategy {
            capabilities: &[],
            toggle: None,
            optimistic: false,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn plan(domain: &str, current: &str) -> Option<TogglePlan> {
        strategy_for(&Domain::parse(domain)).toggle_plan(current)
    }

    #[test]
    fn on_off_domains_flip() {
        for domain in ["light", "switch", "fan", "input_boolean", "vacuum"] {
            let p = plan(domain, "off").unwrap();
            assert_eq!(p.service, "turn_on", "{domain}");
            assert_eq!(p.target_state, Some("on"));

            let p = plan(domain, "on").unwrap();
            assert_eq!(p.service, "turn_off", "{domain}");
            assert_eq!(p.target_state, Some("off"));
        }
    }

    #[test]
    fn unavailable_toggles_towards_on() {
        assert_eq!(plan("light", "unavailable").unwrap().service, "turn_on");
    }

    #[test]
    fn cover_and_lock_use_their_own_services() {
        assert_eq!(
            plan("cover", "open").unwrap(),
            TogglePlan {
                service: "close_cover",
                target_state: Some("closed"),
            }
        );
        assert_eq!(
            plan("lock", "unlocked").unwrap(),
            TogglePlan {
                service: "lock",
                target_state: Some("locked"),
            }
        );
    }

    #[test]
    fn media_player_is_never_optimistic() {
        let strategy = strategy_for(&Domain::MediaPlayer);
        assert!(!strategy.optimistic);
        assert!(strategy.supports(Capability::MediaTransport));

        let p = strategy.toggle_plan("playing").unwrap();
        assert_eq!(p.service, "turn_off");
        assert_eq!(p.target_state, None);
        assert_eq!(strategy.toggle_plan("standby").unwrap().service, "turn_on");
    }

    #[test]
    fn activations_have_no_target() {
        assert_eq!(plan("scene", "scening").unwrap().service, "turn_on");
        assert_eq!(plan("script", "off").unwrap().target_state, None);
        assert_eq!(plan("button", "unknown").unwrap().service, "press");
        assert!(!strategy_for(&Domain::InputButton).optimistic);
    }

    #[test]
    fn read_only_domains_cannot_toggle() {
        for domain in ["sensor", "binary_sensor", "camera", "number", "select"] {
            assert!(plan(domain, "on").is_none(), "{domain}");
        }
        assert!(strategy_for(&Domain::Number).supports(Capability::SetValue));
        assert!(strategy_for(&Domain::InputSelect).supports(Capability::SelectOption));
    }
}
