fn main() -> eframe::Result {
    caricature_canvas::run_native()
}
