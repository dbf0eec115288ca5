//! Tree-walking interpreter for the nodus dialect
//!
//! Executes a compiled [`Program`] inside a module namespace. The namespace
//! is live: assignments are visible to any other handle immediately, which
//! is what gives cyclic `require` its partial-namespace contract.

use crate::engine::parser::{Expr, Program, Stmt, Target};
use crate::engine::value::{Builtin, Value};
use crate::error::ExecError;
use crate::module::Namespace;

/// Internal symbol the import-syntax extension expands `import * from`
/// into. Resolved by the interpreter against the scope's own `require`.
pub const IMPORT_STAR: &str = "__import_star__";

pub fn execute(program: &Program, scope: &Namespace) -> Result<(), ExecError> {
    for stmt in &program.stmts {
        exec_stmt(stmt, scope)?;
    }
    Ok(())
}

fn exec_stmt(stmt: &Stmt, scope: &Namespace) -> Result<(), ExecError> {
    match stmt {
        Stmt::Assign {
            target,
            value,
            line,
        } => {
            let value = eval(value, scope, *line)?;
            assign(target, value, scope, *line)
        }
        Stmt::Expr { expr, line } => {
            eval(expr, scope, *line)?;
            Ok(())
        }
    }
}

fn assign(target: &Target, value: Value, scope: &Namespace, line: u32) -> Result<(), ExecError> {
    match target {
        Target::Name(name) => {
            scope.set(name.clone(), value);
            Ok(())
        }
        Target::Member(object, attr) => {
            let object = eval(object, scope, line)?;
            match &object {
                Value::Object(_) => {
                    object.set_attr(attr, value);
                    Ok(())
                }
                Value::Module(module) if attr == "exports" => {
                    module.namespace().set("exports", value);
                    Ok(())
                }
                Value::Require(require) if attr == "main" => {
                    let main = match value {
                        Value::Module(m) => Some(m),
                        Value::Null => None,
                        other => {
                            return Err(ExecError::script(
                                format!("require.main expects a module, got {}", other.type_name()),
                                line,
                            ))
                        }
                    };
                    require.set_main(main);
                    Ok(())
                }
                other => Err(ExecError::script(
                    format!("cannot set attribute '{}' on {}", attr, other.type_name()),
                    line,
                )),
            }
        }
    }
}

fn eval(expr: &Expr, scope: &Namespace, line: u32) -> Result<Value, ExecError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Num(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Name(name) => scope.get(name).ok_or_else(|| {
            ExecError::script(format!("name '{}' is not defined", name), line)
        }),
        Expr::Member(object, attr) => {
            let object = eval(object, scope, line)?;
            member(&object, attr, line)
        }
        Expr::Call(callee, args) => {
            // Star imports need the scope itself, so they are a special form
            // rather than a builtin.
            if let Expr::Name(name) = &**callee {
                if name == IMPORT_STAR {
                    return import_star(args, scope, line);
                }
            }
            let callee = eval(callee, scope, line)?;
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval(arg, scope, line)?);
            }
            call(&callee, &evaluated, line)
        }
        Expr::Object(pairs) => {
            let mut items = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                items.push((key.clone(), eval(value, scope, line)?));
            }
            Ok(Value::object(items))
        }
        Expr::List(items) => {
            let mut evaluated = Vec::with_capacity(items.len());
            for item in items {
                evaluated.push(eval(item, scope, line)?);
            }
            Ok(Value::list(evaluated))
        }
        Expr::Eq(a, b) => Ok(Value::Bool(eval(a, scope, line)? == eval(b, scope, line)?)),
        Expr::Ne(a, b) => Ok(Value::Bool(eval(a, scope, line)? != eval(b, scope, line)?)),
    }
}

fn member(object: &Value, attr: &str, line: u32) -> Result<Value, ExecError> {
    match object {
        Value::Object(_) => object.get_attr(attr).ok_or_else(|| {
            ExecError::script(format!("no attribute '{}'", attr), line)
        }),
        Value::Module(module) => match attr {
            "exports" => Ok(module.exported()),
            "namespace" => Ok(module.namespace().object_value()),
            "filename" => Ok(Value::str(module.filename().to_string())),
            "directory" => Ok(Value::str(module.directory().to_string())),
            "package" => Ok(module
                .package()
                .map(|p| Value::str(p.name().to_string()))
                .unwrap_or(Value::Null)),
            other => Err(ExecError::script(
                format!("module has no attribute '{}'", other),
                line,
            )),
        },
        Value::Require(require) => match attr {
            "main" => Ok(require
                .main()
                .map(Value::Module)
                .unwrap_or(Value::Null)),
            "current" => Ok(require
                .current()
                .map(Value::Module)
                .unwrap_or(Value::Null)),
            "path" => Ok(Value::list(
                require
                    .path()
                    .into_iter()
                    .map(|p| Value::str(p.to_string()))
                    .collect(),
            )),
            "cache" => Ok(Value::object(
                require
                    .cache_pairs()
                    .into_iter()
                    .map(|(name, module)| (name, Value::Module(module))),
            )),
            "resolve" => {
                let require = require.clone();
                Ok(Builtin::new("require.resolve", move |args| {
                    let request = expect_str(args, 0, "require.resolve")?;
                    let path = require.resolve(&request)?;
                    Ok(Value::str(path.to_string()))
                }))
            }
            "hide_main" => {
                let require = require.clone();
                Ok(Builtin::new("require.hide_main", move |_args| {
                    let previous = require.detach_main();
                    Ok(previous.map(Value::Module).unwrap_or(Value::Null))
                }))
            }
            other => Err(ExecError::script(
                format!("require has no attribute '{}'", other),
                line,
            )),
        },
        other => Err(ExecError::script(
            format!("{} has no attributes", other.type_name()),
            line,
        )),
    }
}

fn call(callee: &Value, args: &[Value], line: u32) -> Result<Value, ExecError> {
    let result = match callee {
        Value::Builtin(builtin) => (builtin.func)(args),
        Value::Require(require) => {
            let request = expect_str(args, 0, "require")?;
            require.require(&request).map_err(ExecError::from)
        }
        other => Err(ExecError::script(
            format!("{} is not callable", other.type_name()),
            line,
        )),
    };
    // Builtins raise without location; anchor them to the call site.
    result.map_err(|e| match e {
        ExecError::Script {
            message,
            filename,
            line: 0,
        } => ExecError::Script {
            message,
            filename,
            line,
        },
        other => other,
    })
}

fn import_star(args: &[Expr], scope: &Namespace, line: u32) -> Result<Value, ExecError> {
    let request = match args.first() {
        Some(Expr::Str(s)) => s.clone(),
        _ => {
            return Err(ExecError::script(
                "star import expects a request string",
                line,
            ))
        }
    };
    let require = match scope.get("require") {
        Some(Value::Require(r)) => r,
        _ => {
            return Err(ExecError::script(
                "star import outside a module scope",
                line,
            ))
        }
    };
    require
        .star_import(&request, scope)
        .map_err(ExecError::from)?;
    Ok(Value::Null)
}

fn expect_str(args: &[Value], index: usize, what: &str) -> Result<String, ExecError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(ExecError::script(
            format!("{} expects a string, got {}", what, other.type_name()),
            0,
        )),
        None => Err(ExecError::script(
            format!("{} expects an argument", what),
            0,
        )),
    }
}

/// The builtins injected into every module namespace.
pub fn standard_builtins() -> Vec<(&'static str, Value)> {
    vec![
        (
            "assert",
            Builtin::new("assert", |args| {
                let ok = args.first().map(Value::truthy).unwrap_or(false);
                if ok {
                    Ok(Value::Null)
                } else {
                    let message = args
                        .get(1)
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "assertion failed".to_string());
                    Err(ExecError::script(message, 0))
                }
            }),
        ),
        (
            "print",
            Builtin::new("print", |args| {
                let text = args
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{}", text);
                Ok(Value::Null)
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::parse;

    fn run(source: &str) -> Result<Namespace, ExecError> {
        let scope = Namespace::new();
        for (name, value) in standard_builtins() {
            scope.set(name, value);
        }
        execute(&parse(source)?, &scope)?;
        Ok(scope)
    }

    #[test]
    fn test_assignment_and_lookup() {
        let ns = run("x = 1\ny = x").unwrap();
        assert_eq!(ns.get("y"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_object_literals_and_members() {
        let ns = run("exports = {x: 1}\nv = exports.x").unwrap();
        assert_eq!(ns.get("v"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_member_assignment() {
        let ns = run("exports = {}\nexports.x = 42").unwrap();
        assert_eq!(
            ns.get("exports").unwrap().get_attr("x"),
            Some(Value::Number(42.0))
        );
    }

    #[test]
    fn test_assert_passes_and_fails() {
        assert!(run("assert(true)").is_ok());
        assert!(run("assert(1 == 1)").is_ok());
        let err = run("x = 1\nassert(x == 2)").unwrap_err();
        match err {
            ExecError::Script { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_undefined_name() {
        let err = run("x = missing").unwrap_err();
        assert!(err.to_string().contains("not defined"));
    }

    #[test]
    fn test_equality_values() {
        let ns = run("a = 'x' == 'x'\nb = 1 != 2").unwrap();
        assert_eq!(ns.get("a"), Some(Value::Bool(true)));
        assert_eq!(ns.get("b"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_non_callable() {
        let err = run("x = 1\nx()").unwrap_err();
        assert!(err.to_string().contains("not callable"));
    }
}
