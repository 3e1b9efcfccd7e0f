use std::path::PathBuf;

use ct_volume::{
    enums::{ExtractionMode, Orientation, SortBy},
    stl,
    volume_loader::VolumeLoader,
    windowing::{self, WindowSpec},
};

fn main() {
    let mut args = std::env::args().skip(1);
    let directory = args.next().unwrap_or_else(|| "dicom".to_string());
    let threshold: f32 = args
        .next()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(300.0);

    let volume = VolumeLoader::load_from_directory(&PathBuf::from(directory), SortBy::Position)
        .expect("should have loaded files from directory");
    let (depth, height, width) = volume.dim();
    println!(
        "volume {depth}x{height}x{width}, spacing {:?}",
        volume.spacing()
    );

    let spec = WindowSpec::from_volume(&volume);
    let display = volume
        .window_image(depth / 2, Orientation::Axial, spec)
        .expect("should have windowed center slice");
    windowing::to_image(&display)
        .expect("should have converted display image")
        .save("slice.png")
        .expect("should have saved preview image");

    let mesh = volume
        .extract_surface(threshold, ExtractionMode::Binary, None)
        .expect("should have extracted a surface");
    println!(
        "mesh: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );

    let mut file =
        std::fs::File::create(stl::EXPORT_FILENAME).expect("should have created STL file");
    stl::write_ascii(&mesh, &mut file).expect("should have written STL");
}
