/// Operation every control unit answers with its identity fields
pub static IDENTIFY_OPERATION: &str = "identify";

pub static PART_NUMBER: &str = "part_number";
pub static HARDWARE_NUMBER: &str = "hardware_number";
pub static SOFTWARE_NUMBER: &str = "software_number";
pub static CODING_INDEX: &str = "coding_index";
pub static DIAG_INDEX: &str = "diag_index";
