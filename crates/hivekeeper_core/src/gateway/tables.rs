//! Remote table and storage bucket names.

pub const HIVES: &str = "hives";
pub const ACTIONS: &str = "actions";
pub const TRANSACTIONS: &str = "transactions";
pub const PROFILES: &str = "profiles";

pub const FEEDING_DETAILS: &str = "feeding_details";
pub const HARVEST_DETAILS: &str = "harvest_details";
pub const INSPECTION_DETAILS: &str = "inspection_details";
pub const MAINTENANCE_DETAILS: &str = "maintenance_details";
pub const TRANSFER_DETAILS: &str = "transfer_details";
pub const DIVISION_DETAILS: &str = "division_details";

pub const SPECIES: &str = "species";
pub const BOX_TYPES: &str = "box_types";
pub const FOOD_TYPES: &str = "food_types";

pub const HIVE_PHOTOS_BUCKET: &str = "hive-photos";
pub const AVATARS_BUCKET: &str = "avatars";
