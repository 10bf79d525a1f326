use std::env;
use std::fs;

use mvtcodec::vector_tile::tile::GeomType;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <path-to-mvt-file>", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let data = fs::read(path).expect("Failed to read MVT file");

    let features = mvtcodec::decode(&data).expect("Failed to parse MVT tile");
    println!("features={}", features.len());

    for feature in &features {
        println!("feature.layer={}", feature.layer);
        println!("feature.id={}", feature.id);
        println!("feature.type={:?}", feature.geometry.geom_type);

        for (key, value) in &feature.attrs {
            match value {
                Some(value) => println!("feature.attr.{}={}", key, format_value(value)),
                None => println!("feature.attr.{}=null", key),
            }
        }

        if feature.geometry.geom_type == GeomType::Unknown {
            println!("feature.geometry.raw={}", feature.geometry.commands.len());
            continue;
        }
        match feature.geometry.decode() {
            Ok(geometry) => println!("feature.geometry={:?}", geometry),
            Err(e) => println!("feature.geometry.error={}", e),
        }
    }
}

fn format_value(value: &mvtcodec::Value) -> String {
    use mvtcodec::Value;
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Float(bytes) => format!("{}", f32::from_ne_bytes(*bytes)),
        Value::Double(bytes) => format!("{}", f64::from_ne_bytes(*bytes)),
        Value::Int(i) => format!("{}", i),
        Value::Uint(u) => format!("{}", u),
        Value::SInt(s) => format!("{}", s),
        Value::Bool(b) => format!("{}", b),
    }
}
