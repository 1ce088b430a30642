fn main() {
    ocean_lod_sim::run();
}
