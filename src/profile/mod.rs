//! Profile adapter: the seam to the external classifier.
//!
//! The extraction core never interprets road tags itself. It hands tags
//! (and relation context) to a `Profile` and receives typed outputs. The
//! embedded scripting runtime of the full product sits behind this same
//! trait; the built-in `CarProfile` stands in for it here.

pub mod car;

pub use car::CarProfile;

use crate::ids::ClassData;
use crate::osm::TagMap;
use crate::relations::RelationContext;

/// How an edge may be traversed. Stored per direction on every way.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TravelMode {
    #[default]
    Inaccessible = 0,
    Driving = 1,
    Cycling = 2,
    Walking = 3,
    Ferry = 4,
}

impl TravelMode {
    pub fn is_accessible(self) -> bool {
        self != TravelMode::Inaccessible
    }
}

/// Coarse road class used for turn decisions and the segregated-edge
/// length thresholds.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoadPriority {
    Motorway = 0,
    Trunk = 1,
    Primary = 2,
    Secondary = 3,
    Tertiary = 4,
    #[default]
    Other = 5,
}

impl RoadPriority {
    /// Per-side length threshold for dual-carriageway detection, meters.
    pub fn segregated_threshold_m(self) -> f64 {
        match self {
            RoadPriority::Motorway | RoadPriority::Trunk => 30.0,
            RoadPriority::Primary => 20.0,
            RoadPriority::Secondary | RoadPriority::Tertiary => 10.0,
            RoadPriority::Other => 5.0,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => RoadPriority::Motorway,
            1 => RoadPriority::Trunk,
            2 => RoadPriority::Primary,
            3 => RoadPriority::Secondary,
            4 => RoadPriority::Tertiary,
            _ => RoadPriority::Other,
        }
    }
}

/// Classifier output for a node.
#[derive(Debug, Clone, Default)]
pub struct ExtractionNode {
    pub barrier: bool,
    pub traffic_signal: bool,
    pub classes: Vec<String>,
}

/// Classifier output for a way. Speeds are km/h; a direction with speed
/// zero or an inaccessible mode emits no edges. `duration`, when positive,
/// is a whole-way travel time in seconds (ferries and the like) that gets
/// distributed over segments by length share.
#[derive(Debug, Clone)]
pub struct ExtractionWay {
    pub forward_speed: f64,
    pub backward_speed: f64,
    pub duration: f64,
    pub name: String,
    pub reference: String,
    pub pronunciation: String,
    pub destinations: String,
    pub classes: Vec<String>,
    pub roundabout: bool,
    pub is_startpoint: bool,
    pub forward_mode: TravelMode,
    pub backward_mode: TravelMode,
    pub road_priority: RoadPriority,
    pub lanes_forward: Option<String>,
    pub lanes_backward: Option<String>,
}

impl Default for ExtractionWay {
    fn default() -> Self {
        Self {
            forward_speed: 0.0,
            backward_speed: 0.0,
            duration: 0.0,
            name: String::new(),
            reference: String::new(),
            pronunciation: String::new(),
            destinations: String::new(),
            classes: Vec::new(),
            roundabout: false,
            is_startpoint: true,
            forward_mode: TravelMode::Inaccessible,
            backward_mode: TravelMode::Inaccessible,
            road_priority: RoadPriority::Other,
            lanes_forward: None,
            lanes_backward: None,
        }
    }
}

impl ExtractionWay {
    pub fn forward_enabled(&self) -> bool {
        self.forward_mode.is_accessible() && (self.forward_speed > 0.0 || self.duration > 0.0)
    }

    pub fn backward_enabled(&self) -> bool {
        self.backward_mode.is_accessible() && (self.backward_speed > 0.0 || self.duration > 0.0)
    }
}

/// Everything the turn function gets to see about one candidate turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext {
    /// 180 is straight through, 0/360 a U-turn (see `geo::turn_angle`).
    pub angle: f64,
    pub from_classes: ClassData,
    pub to_classes: ClassData,
    pub from_priority: RoadPriority,
    pub to_priority: RoadPriority,
    pub has_traffic_signal: bool,
    pub through_barrier: bool,
    /// Number of distinct roads meeting at the via junction.
    pub number_of_roads: usize,
}

/// Turn function result; weight and duration in seconds.
#[derive(Debug, Clone, Copy)]
pub struct TurnPenalty {
    pub weight: f64,
    pub duration: f64,
    pub allowed: bool,
}

impl TurnPenalty {
    pub fn forbidden() -> Self {
        Self {
            weight: 0.0,
            duration: 0.0,
            allowed: false,
        }
    }
}

/// Profile-wide settings persisted into the `.properties` artifact.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProfileProperties {
    pub profile_name: String,
    pub weight_name: String,
    pub traffic_signal_penalty: f64,
    pub u_turn_penalty: f64,
    pub use_turn_restrictions: bool,
    pub continue_straight_at_waypoint: bool,
    pub left_hand_driving: bool,
    pub max_speed: f64,
    /// Index-addressed class names, filled in by the extractor from the
    /// classes the profile declared and used.
    pub class_names: Vec<String>,
    /// Excludable class combinations as masks; index 0 is reserved for
    /// "exclude nothing".
    pub excludable_classes: Vec<ClassData>,
}

impl Default for ProfileProperties {
    fn default() -> Self {
        Self {
            profile_name: String::new(),
            weight_name: "duration".to_string(),
            traffic_signal_penalty: 0.0,
            u_turn_penalty: 0.0,
            use_turn_restrictions: true,
            continue_straight_at_waypoint: false,
            left_hand_driving: false,
            max_speed: 0.0,
            class_names: Vec::new(),
            excludable_classes: vec![0],
        }
    }
}

/// The classifier callback surface. Implementations may keep per-worker
/// state internally but must be shareable across the worker pool.
pub trait Profile: Sync {
    fn name(&self) -> &str;

    fn process_node(&self, tags: &TagMap) -> ExtractionNode;

    /// `None` means the way is not routable for this profile.
    fn process_way(&self, tags: &TagMap, relations: &RelationContext) -> Option<ExtractionWay>;

    fn process_turn(&self, turn: &TurnContext) -> TurnPenalty;

    /// Relation types the indexer should record during pass A.
    fn relation_types(&self) -> Vec<String>;

    /// Transport modes this profile obeys restrictions for
    /// (e.g. `motorcar`, `vehicle`).
    fn restriction_filters(&self) -> Vec<String>;

    fn class_names(&self) -> Vec<String>;

    fn excludable_classes(&self) -> Vec<Vec<String>>;

    fn has_location_dependent_data(&self) -> bool {
        false
    }

    fn properties(&self) -> ProfileProperties;
}
