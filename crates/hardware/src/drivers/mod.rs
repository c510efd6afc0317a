//! Simulation drivers: full implementations of the adapter contracts with
//! no hardware behind them.

mod fake_buttons;
mod fake_spindles;
mod inmem;

pub use fake_buttons::FakeButtons;
pub use fake_spindles::FakeSpindles;
pub use inmem::InMemSteppers;
