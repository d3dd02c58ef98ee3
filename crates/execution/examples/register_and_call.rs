use std::sync::Arc;

use sfq_common::{RegistryConfig, Result};
use sfq_execution::{
    Arity, FnUdf, ProcessingContext, SharedContext, UdfRegistry, Variadic, convert_generic,
};
use sfq_types::Value;
use tracing_subscriber::EnvFilter;

fn pow(x: f32, y: f32) -> std::result::Result<f32, String> {
    let out = x.powf(y);
    if out.is_finite() {
        Ok(out)
    } else {
        Err(format!("{x}^{y} is not finite"))
    }
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let mut config = RegistryConfig::from_env()?;
    config.record_call_metrics = true;
    let registry = UdfRegistry::new(config);

    registry.register("pow", Arc::new(convert_generic(pow)?))?;
    registry.register("inc", Arc::new(convert_generic(|x: i64| x + 1)?))?;
    registry.register("inc", Arc::new(convert_generic(|x: i64, by: i64| x + by)?))?;
    registry.register(
        "concat_ws",
        Arc::new(convert_generic(
            |ctx: SharedContext, sep: String, parts: Variadic<String>| {
                ctx.check()?;
                Ok::<_, sfq_common::SfqError>(parts.join(sep.as_str()))
            },
        )?),
    )?;
    registry.register(
        "count_non_null",
        Arc::new(
            FnUdf::new(Arity::Exact(1), |_ctx, args| match &args[0] {
                Value::Array(items) => {
                    Ok(Value::Int(items.iter().filter(|v| !v.is_null()).count() as i64))
                }
                other => Ok(Value::Int(i64::from(!other.is_null()))),
            })
            .with_aggregation_params([0]),
        ),
    )?;
    registry.alias("concat_ws", "join")?;
    registry.freeze();

    let ctx = ProcessingContext::new("register_and_call").shared();
    let calls: Vec<(&str, Vec<Value>)> = vec![
        ("POW", vec![Value::from("2"), Value::Int(10)]),
        ("inc", vec![Value::Int(41)]),
        ("inc", vec![Value::Int(40), Value::from("2")]),
        ("join", vec![Value::from(", "), Value::Int(1), Value::Float(2.5), Value::from("x")]),
        (
            "count_non_null",
            vec![Value::Array(vec![Value::Int(1), Value::Null, Value::from("a")])],
        ),
    ];
    for (name, args) in calls {
        let udf = registry.resolve(name, args.len())?;
        let out = udf.call(&ctx, &args)?;
        println!("{name}({}) = {out}", render_args(&args));
    }

    match registry.resolve("inc", 3) {
        Ok(_) => println!("inc/3 unexpectedly resolved"),
        Err(e) => println!("inc/3 -> {e}"),
    }
    match registry.resolve("pow", 2)?.call(&ctx, &[Value::Float(10.0), Value::Int(100)]) {
        Ok(v) => println!("pow(10, 100) = {v}"),
        Err(e) => println!("pow(10, 100) -> {e}"),
    }

    println!("registered: {}", registry.names().join(", "));
    print!("{}", registry.metrics().render_prometheus());
    Ok(())
}

fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
