//! Built-in car profile: tag semantics for automobile routing.

use super::{
    ExtractionNode, ExtractionWay, Profile, ProfileProperties, RoadPriority, TravelMode,
    TurnContext, TurnPenalty,
};
use crate::osm::TagMap;
use crate::relations::RelationContext;

const TRAFFIC_SIGNAL_PENALTY_S: f64 = 2.0;
const MAX_SPEED_KMH: f64 = 140.0;

pub struct CarProfile;

fn is_denied(value: Option<&str>) -> bool {
    matches!(value, Some("no") | Some("private") | Some("agricultural") | Some("delivery"))
}

fn road_priority(highway: &str) -> RoadPriority {
    match highway {
        "motorway" | "motorway_link" => RoadPriority::Motorway,
        "trunk" | "trunk_link" => RoadPriority::Trunk,
        "primary" | "primary_link" => RoadPriority::Primary,
        "secondary" | "secondary_link" => RoadPriority::Secondary,
        "tertiary" | "tertiary_link" => RoadPriority::Tertiary,
        _ => RoadPriority::Other,
    }
}

impl Profile for CarProfile {
    fn name(&self) -> &str {
        "car"
    }

    fn process_node(&self, tags: &TagMap) -> ExtractionNode {
        let mut node = ExtractionNode::default();

        if let Some(barrier) = tags.get("barrier") {
            // Most barriers block cars unless access says otherwise.
            let passable = matches!(
                barrier,
                "border_control" | "toll_booth" | "checkpoint" | "cattle_grid" | "entrance"
            );
            let access_allows = matches!(
                tags.get("access").or_else(|| tags.get("motor_vehicle")),
                Some("yes") | Some("permissive") | Some("designated")
            );
            node.barrier = !passable && !access_allows;
        }

        if tags.get("highway") == Some("traffic_signals") {
            node.traffic_signal = true;
        }

        node
    }

    fn process_way(&self, tags: &TagMap, _relations: &RelationContext) -> Option<ExtractionWay> {
        let highway = tags.get("highway")?;

        let (accessible, base_speed_kmh) = match highway {
            "motorway" => (true, 110.0),
            "motorway_link" => (true, 60.0),
            "trunk" => (true, 90.0),
            "trunk_link" => (true, 50.0),
            "primary" => (true, 70.0),
            "primary_link" => (true, 40.0),
            "secondary" => (true, 60.0),
            "secondary_link" => (true, 40.0),
            "tertiary" => (true, 50.0),
            "tertiary_link" => (true, 30.0),
            "unclassified" => (true, 50.0),
            "residential" => (true, 30.0),
            "service" => (true, 20.0),
            "living_street" => (true, 10.0),
            _ => (false, 0.0),
        };
        if !accessible {
            return None;
        }

        if is_denied(tags.get("motor_vehicle"))
            || is_denied(tags.get("vehicle"))
            || is_denied(tags.get("access"))
        {
            return None;
        }

        let speed = match tags.get("maxspeed").and_then(|v| v.parse::<f64>().ok()) {
            Some(limit) if limit > 0.0 => limit.min(base_speed_kmh * 1.2),
            _ => base_speed_kmh,
        };

        let mut way = ExtractionWay {
            forward_speed: speed,
            backward_speed: speed,
            forward_mode: TravelMode::Driving,
            backward_mode: TravelMode::Driving,
            road_priority: road_priority(highway),
            ..ExtractionWay::default()
        };

        match tags.get("oneway") {
            Some("yes") | Some("1") | Some("true") => {
                way.backward_mode = TravelMode::Inaccessible;
            }
            Some("-1") | Some("reverse") => {
                way.forward_mode = TravelMode::Inaccessible;
            }
            _ => {
                // Motorways and roundabouts are implied oneway.
                if highway == "motorway"
                    || highway == "motorway_link"
                    || tags.get("junction") == Some("roundabout")
                {
                    way.backward_mode = TravelMode::Inaccessible;
                }
            }
        }

        way.roundabout = tags.get("junction") == Some("roundabout");
        // Service roads make poor snap targets for route starts.
        way.is_startpoint = highway != "service";

        if let Some(name) = tags.get("name") {
            way.name = name.to_string();
        }
        if let Some(reference) = tags.get("ref") {
            way.reference = reference.to_string();
        }
        if let Some(pronunciation) = tags.get("name:pronunciation") {
            way.pronunciation = pronunciation.to_string();
        }
        if let Some(destinations) = tags.get("destination") {
            way.destinations = destinations.to_string();
        }

        if tags.get("toll") == Some("yes") {
            way.classes.push("toll".to_string());
        }
        if highway == "motorway" || highway == "motorway_link" {
            way.classes.push("motorway".to_string());
        }

        way.lanes_forward = tags
            .get("turn:lanes:forward")
            .or_else(|| tags.get("turn:lanes"))
            .map(str::to_string);
        way.lanes_backward = tags.get("turn:lanes:backward").map(str::to_string);

        Some(way)
    }

    fn process_turn(&self, turn: &TurnContext) -> TurnPenalty {
        if turn.through_barrier {
            return TurnPenalty::forbidden();
        }

        // Quadratic penalty on deviation from going straight; a 90 degree
        // turn costs about 1.9 s at the chosen scale.
        let deviation = (turn.angle - 180.0).abs() / 180.0;
        let mut duration = 7.5 * deviation * deviation;

        if turn.has_traffic_signal {
            duration += TRAFFIC_SIGNAL_PENALTY_S;
        }

        TurnPenalty {
            weight: duration,
            duration,
            allowed: true,
        }
    }

    fn relation_types(&self) -> Vec<String> {
        vec!["route".to_string()]
    }

    fn restriction_filters(&self) -> Vec<String> {
        vec![
            "motorcar".to_string(),
            "motor_vehicle".to_string(),
            "vehicle".to_string(),
        ]
    }

    fn class_names(&self) -> Vec<String> {
        vec!["toll".to_string(), "motorway".to_string()]
    }

    fn excludable_classes(&self) -> Vec<Vec<String>> {
        vec![vec!["toll".to_string()], vec!["motorway".to_string()]]
    }

    fn properties(&self) -> ProfileProperties {
        ProfileProperties {
            profile_name: "car".to_string(),
            weight_name: "duration".to_string(),
            traffic_signal_penalty: TRAFFIC_SIGNAL_PENALTY_S,
            u_turn_penalty: 20.0,
            use_turn_restrictions: true,
            continue_straight_at_waypoint: true,
            left_hand_driving: false,
            max_speed: MAX_SPEED_KMH,
            ..ProfileProperties::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        TagMap::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn residential_way_is_bidirectional() {
        let way = CarProfile
            .process_way(&tags(&[("highway", "residential")]), &RelationContext::default())
            .unwrap();
        assert!(way.forward_enabled());
        assert!(way.backward_enabled());
        assert_eq!(way.forward_speed, 30.0);
    }

    #[test]
    fn oneway_disables_backward() {
        let way = CarProfile
            .process_way(
                &tags(&[("highway", "primary"), ("oneway", "yes")]),
                &RelationContext::default(),
            )
            .unwrap();
        assert!(way.forward_enabled());
        assert!(!way.backward_enabled());
    }

    #[test]
    fn footway_is_not_routable() {
        assert!(CarProfile
            .process_way(&tags(&[("highway", "footway")]), &RelationContext::default())
            .is_none());
    }

    #[test]
    fn gate_is_a_barrier_unless_open_access() {
        let node = CarProfile.process_node(&tags(&[("barrier", "gate")]));
        assert!(node.barrier);

        let node = CarProfile.process_node(&tags(&[("barrier", "gate"), ("access", "yes")]));
        assert!(!node.barrier);
    }

    #[test]
    fn straight_turns_are_cheap() {
        let base = TurnContext {
            angle: 180.0,
            from_classes: 0,
            to_classes: 0,
            from_priority: RoadPriority::Other,
            to_priority: RoadPriority::Other,
            has_traffic_signal: false,
            through_barrier: false,
            number_of_roads: 2,
        };
        let straight = CarProfile.process_turn(&base);
        assert!(straight.allowed);
        assert!(straight.duration < 0.01);

        let sharp = CarProfile.process_turn(&TurnContext { angle: 90.0, ..base });
        assert!(sharp.duration > straight.duration);
    }

    #[test]
    fn barrier_blocks_turns() {
        let turn = CarProfile.process_turn(&TurnContext {
            angle: 180.0,
            from_classes: 0,
            to_classes: 0,
            from_priority: RoadPriority::Other,
            to_priority: RoadPriority::Other,
            has_traffic_signal: false,
            through_barrier: true,
            number_of_roads: 2,
        });
        assert!(!turn.allowed);
    }
}
