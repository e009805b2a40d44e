use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

// ============================================================================
// Camera constants
// ============================================================================

pub const PAN_OUT_ZOOM: f64 = 13.0;
pub const TRAVEL_ZOOM: f64 = 17.0;
pub const END_PITCH: f64 = 60.0;
pub const END_BEARING: f64 = -20.0;

pub const PAN_OUT_MS: u32 = 2000;
pub const TRAVEL_MS: u32 = 5000;
pub const TILT_IN_MS: u32 = 1500;
pub const SELECTION_MS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    /// Straight interpolation between views.
    Ease,
    /// Zoom-out-and-in arc, for long distances.
    Fly,
}

/// One camera instruction for the host's map. Unset fields keep their value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct CameraMove {
    pub motion: Motion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    pub pitch: f64,
    pub bearing: f64,
    pub duration_ms: u32,
    /// Not interruptible by user input.
    pub essential: bool,
}

// ============================================================================
// Fly-to sequence
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum FlyToStage {
    PanningOut,
    Travelling,
    TiltingIn,
    Arrived,
}

/// Three-stage camera flight: pan out to a top-down overview, travel to the
/// destination, then tilt into perspective.
///
/// Each stage starts only after the host reports that the previous move
/// ended. Works even when the destination equals the current center.
#[derive(Debug, Clone, PartialEq)]
pub struct FlyTo {
    destination: (f64, f64),
    stage: FlyToStage,
}

impl FlyTo {
    /// Begin a flight to `(lng, lat)`. Returns the sequence and its first move.
    pub fn start(lng: f64, lat: f64) -> (Self, CameraMove) {
        let sequence = Self {
            destination: (lng, lat),
            stage: FlyToStage::PanningOut,
        };
        let first = CameraMove {
            motion: Motion::Ease,
            center: None,
            zoom: Some(PAN_OUT_ZOOM),
            pitch: 0.0,
            bearing: 0.0,
            duration_ms: PAN_OUT_MS,
            essential: true,
        };
        (sequence, first)
    }

    pub fn stage(&self) -> FlyToStage {
        self.stage
    }

    pub fn destination(&self) -> (f64, f64) {
        self.destination
    }

    pub fn is_done(&self) -> bool {
        self.stage == FlyToStage::Arrived
    }

    /// Advance on the host's move-end signal. Returns the next move, or
    /// `None` once the camera has arrived.
    pub fn on_move_end(&mut self) -> Option<CameraMove> {
        match self.stage {
            FlyToStage::PanningOut => {
                self.stage = FlyToStage::Travelling;
                Some(CameraMove {
                    motion: Motion::Fly,
                    center: Some(self.destination),
                    zoom: Some(TRAVEL_ZOOM),
                    pitch: 0.0,
                    bearing: 0.0,
                    duration_ms: TRAVEL_MS,
                    essential: true,
                })
            }
            FlyToStage::Travelling => {
                self.stage = FlyToStage::TiltingIn;
                Some(CameraMove {
                    motion: Motion::Ease,
                    center: None,
                    zoom: None,
                    pitch: END_PITCH,
                    bearing: END_BEARING,
                    duration_ms: TILT_IN_MS,
                    essential: true,
                })
            }
            FlyToStage::TiltingIn => {
                self.stage = FlyToStage::Arrived;
                None
            }
            FlyToStage::Arrived => None,
        }
    }
}

/// Top-down view one zoom level out, used when entering area selection.
pub fn selection_view(current_zoom: f64) -> CameraMove {
    CameraMove {
        motion: Motion::Ease,
        center: None,
        zoom: Some(current_zoom - 1.0),
        pitch: 0.0,
        bearing: 0.0,
        duration_ms: SELECTION_MS,
        essential: false,
    }
}
