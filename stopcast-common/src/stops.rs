//! Fixed stop reference data
//!
//! The stop list is immutable reference data. It is upserted into the
//! `stops` table at startup and also drives synthetic dataset generation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Land-use category of a stop; selects its demand pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Religious,
    Student,
    Government,
    Mixed,
    Commercial,
    University,
    TransportHub,
    Medical,
    Financial,
    Recreational,
    Residential,
}

impl StopType {
    pub const ALL: [StopType; 11] = [
        StopType::Religious,
        StopType::Student,
        StopType::Government,
        StopType::Mixed,
        StopType::Commercial,
        StopType::University,
        StopType::TransportHub,
        StopType::Medical,
        StopType::Financial,
        StopType::Recreational,
        StopType::Residential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::Religious => "religious",
            StopType::Student => "student",
            StopType::Government => "government",
            StopType::Mixed => "mixed",
            StopType::Commercial => "commercial",
            StopType::University => "university",
            StopType::TransportHub => "transport_hub",
            StopType::Medical => "medical",
            StopType::Financial => "financial",
            StopType::Recreational => "recreational",
            StopType::Residential => "residential",
        }
    }
}

impl fmt::Display for StopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StopType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown stop type: {}", s)))
    }
}

/// One entry of the seeded stop list
#[derive(Debug, Clone, Copy)]
pub struct StopSeed {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub description: &'static str,
    pub stop_type: StopType,
    /// Demand at coastal stops rises at high tide
    pub coastal: bool,
}

const fn seed(
    name: &'static str,
    latitude: f64,
    longitude: f64,
    description: &'static str,
    stop_type: StopType,
) -> StopSeed {
    StopSeed {
        name,
        latitude,
        longitude,
        description,
        stop_type,
        coastal: false,
    }
}

const fn coastal(mut stop: StopSeed) -> StopSeed {
    stop.coastal = true;
    stop
}

/// The 26 stops served by the route
pub const STOPS: [StopSeed; 26] = [
    seed(
        "Saint Gabriel The Archangel Parish",
        16.0754843,
        120.3546182,
        "Church where students from Bonuan Boquig practice",
        StopType::Religious,
    ),
    seed(
        "Alip, Boquig Waiting Shed",
        16.073742,
        120.351614,
        "Popular waiting spot for students going home",
        StopType::Student,
    ),
    seed(
        "Bonuan Boquig, Baranggay Hall",
        16.076286,
        120.3557308,
        "Students and citizens wait near barangay hall",
        StopType::Government,
    ),
    seed(
        "Sagor, Longos",
        16.066106,
        120.353298,
        "Students and workers wait to go to school/work",
        StopType::Mixed,
    ),
    seed(
        "Centro, Longos",
        16.070591,
        120.359635,
        "Students and workers wait to go to school/work",
        StopType::Mixed,
    ),
    seed(
        "Don Leon Francisco Maramba Elementary School, Longos",
        16.0710835,
        120.3591833,
        "Students wait to go home",
        StopType::Student,
    ),
    seed(
        "Bonuan Boquig - Biazon Waiting Shed",
        16.0756322,
        120.3656381,
        "Students and citizens wait,
        farther from school",
        StopType::Student,
    ),
    seed(
        "Bonuan Buquig National Highschool",
        16.078721,
        120.360024,
        "High school students location",
        StopType::Student,
    ),
    seed("7 Eleven Bonuan", 16.075331, 120.342945, "Center of Bonuan area", StopType::Commercial),
    seed(
        "North Central, Don Marcelo Elementary School",
        16.073780,
        120.340295,
        "Two elementary schools facing each other",
        StopType::Student,
    ),
    seed("MCDo Bonuan", 16.0722655, 120.3386216, "Popular eating spot", StopType::Commercial),
    seed(
        "Nepo Mall",
        16.0511218,
        120.3408555,
        "Universidad de Dagupan students and workers wait here",
        StopType::Commercial,
    ),
    seed(
        "Universidad De Dagupan",
        16.0511218,
        120.3408555,
        "Students wait here to go to city proper",
        StopType::University,
    ),
    seed(
        "Junction",
        16.046392,
        120.343012,
        "Main hub for Bonuan and bayan routes",
        StopType::TransportHub,
    ),
    seed(
        "Region 1 Medical Center",
        16.048645,
        120.341774,
        "Medical center stop",
        StopType::Medical,
    ),
    seed(
        "Phinma-University of Pangasinan",
        16.046392,
        120.343012,
        "College students school",
        StopType::University,
    ),
    seed(
        "CSI City Mall",
        16.043989,
        120.335708,
        "Middle of city proper,
        many people wait here",
        StopType::Commercial,
    ),
    seed(
        "Hererro-Perez Waiting Shed",
        16.042155,
        120.342460,
        "PAMMA students waiting spot",
        StopType::Student,
    ),
    seed(
        "Victory, Five Star",
        16.042842,
        120.344109,
        "Bus terminal for other towns/cities",
        StopType::TransportHub,
    ),
    seed(
        "SM Center Dagupan",
        16.0444626,
        120.3425649,
        "Popular mall waiting spot",
        StopType::Commercial,
    ),
    seed("DBP", 16.043786, 120.344272, "Popular waiting spot to go to Bonuan", StopType::Financial),
    coastal(seed(
        "Tondaligan Centro",
        16.084194,
        120.348134,
        "Beach destination",
        StopType::Recreational,
    )),
    seed(
        "Region 1 MC Annex",
        16.090689,
        120.3622115,
        "People from other towns come here",
        StopType::Medical,
    ),
    seed(
        "Bliss Waiting Shed, Binloc",
        16.0935083,
        120.3675867,
        "Bliss residents stop here",
        StopType::Residential,
    ),
    coastal(seed(
        "Leisure Coast Resort",
        16.0959466,
        120.3724469,
        "Universidad de Dagupan students destination",
        StopType::Recreational,
    )),
    seed(
        "Binloc Barangay Hall",
        16.1002609,
        120.3778482,
        "Binloc residents wait and stop",
        StopType::Government,
    ),
];

/// Look up a seeded stop by name
pub fn find_seed(name: &str) -> Option<&'static StopSeed> {
    STOPS.iter().find(|s| s.name == name)
}
