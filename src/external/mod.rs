pub mod finmind;
pub mod google_sheets;
pub mod lenient;
pub mod multi_provider;
pub mod provider;
pub mod sourced;
pub mod twse;
pub mod yahoo;
