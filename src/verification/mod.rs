pub mod testbench;
