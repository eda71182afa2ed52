pub mod browser_manager;
pub mod cdp;
pub mod driver;
pub mod site;
